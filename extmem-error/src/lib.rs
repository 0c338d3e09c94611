#![deny(missing_docs)]

//! Error handling for the extmem crates.
//!
//! Every fallible operation returns an [`ExtmemResult`]. Errors carry a message and may be wrapped
//! with additional context as they propagate outwards. Setting `EXTMEM_PANIC_ON_ERR=1` panics with
//! a captured backtrace at the point an error message is created.

mod ext;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{env, fmt, io};

pub use ext::*;

/// A convenient macro for creating an [`ExtmemError`].
///
/// ```
/// use extmem_error::{extmem_err, ExtmemError};
///
/// let err = extmem_err!(BadCacheSpec: "no shards in {:?}", "");
/// assert!(matches!(err, ExtmemError::BadCacheSpec(..)));
/// ```
#[macro_export]
macro_rules! extmem_err {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use(
            $crate::ExtmemError::$variant(format!($fmt, $($arg),*).into())
        )
    };
    ($variant:ident: $err:expr $(,)?) => {
        $crate::__private::must_use(
            $crate::ExtmemError::$variant($err)
        )
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::extmem_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning an [`ExtmemError`] from the enclosing function.
#[macro_export]
macro_rules! extmem_bail {
    ($($tt:tt)+) => {
        return Err($crate::extmem_err!($($tt)+))
    };
}

/// A convenient macro for panicking with an [`ExtmemError`] in the presence of a programmer error
/// (e.g., an invariant has been violated).
#[macro_export]
macro_rules! extmem_panic {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::extmem_panic!($crate::extmem_err!($variant: $fmt, $($arg),*))
    };
    ($err:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err: $crate::ExtmemError = $err;
        panic!("{}", err.with_context(format!($fmt, $($arg),*)))
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::extmem_panic!(InvalidArgument: $fmt, $($arg),*)
    };
    ($err:expr) => {{
        let err: $crate::ExtmemError = $err;
        panic!("{}", err)
    }};
}

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

#[allow(clippy::fallible_impl_from)]
impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    #[allow(clippy::panic)]
    fn from(msg: T) -> Self {
        if env::var("EXTMEM_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for the extmem crates.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum ExtmemError {
    /// A cache specification resolved to no shards.
    #[error("bad cache spec: {0}")]
    BadCacheSpec(ErrString),
    /// A page file or metadata file header could not be read.
    #[error("bad page header: {0}")]
    BadPageHeader(ErrString),
    /// The format registry has no codec under the requested name.
    #[error("unknown page format: {0}")]
    UnknownFormat(ErrString),
    /// A builder was asked for a page type it cannot produce.
    #[error("unknown page type: {0}")]
    UnknownPageType(ErrString),
    /// Query ids are present for some rows but not all of them.
    #[error("group invariant violated: {0}")]
    GroupInvariant(ErrString),
    /// An invalid argument was provided.
    #[error("{0}")]
    InvalidArgument(ErrString),
    /// A serialized payload is malformed or truncated.
    #[error("{0}")]
    InvalidSerde(ErrString),
    /// An assertion failed.
    #[error("{0}")]
    AssertionFailed(ErrString),
    /// An error annotated with additional context.
    #[error("{0}: {1}")]
    Context(ErrString, Box<ExtmemError>),
    /// A wrapper for IO errors.
    #[error("{0}")]
    IOError(#[from] io::Error),
}

impl ExtmemError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        ExtmemError::Context(msg.into(), Box::new(self))
    }

    /// Returns the innermost error, skipping over any [`ExtmemError::Context`] wrappers.
    pub fn root(&self) -> &ExtmemError {
        match self {
            ExtmemError::Context(_, inner) => inner.root(),
            other => other,
        }
    }
}

impl Debug for ExtmemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return [`ExtmemError`]s as their error type.
pub type ExtmemResult<T> = Result<T, ExtmemError>;

/// A trait for expecting values, panicking with context when they are absent.
pub trait ExtmemExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value, or panics with the given message attached to the underlying error.
    fn extmem_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> ExtmemExpect for Result<T, E>
where
    E: Into<ExtmemError>,
{
    type Output = T;

    #[inline(always)]
    fn extmem_expect(self, msg: &str) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|e| extmem_panic!(e.with_context(msg.to_string())))
    }
}

impl<T> ExtmemExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn extmem_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = ExtmemError::AssertionFailed(msg.to_string().into());
            extmem_panic!(err)
        })
    }
}

#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub const fn must_use(error: crate::ExtmemError) -> crate::ExtmemError {
        error
    }
}
