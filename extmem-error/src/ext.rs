use crate::ExtmemResult;

/// Extra combinators for [`ExtmemResult`].
pub trait ResultExt<T>: private::Sealed {
    /// Collapse a result of a result, such as the outcome of joining a fallible worker thread,
    /// into a single [`ExtmemResult`].
    fn flatten(self) -> ExtmemResult<T>;
}

mod private {
    use crate::ExtmemResult;

    pub trait Sealed {}

    impl<T> Sealed for ExtmemResult<ExtmemResult<T>> {}
}

impl<T> ResultExt<T> for ExtmemResult<ExtmemResult<T>> {
    fn flatten(self) -> ExtmemResult<T> {
        self.and_then(|inner| inner)
    }
}
