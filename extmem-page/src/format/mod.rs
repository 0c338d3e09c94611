use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::io::{Read, Write};
use std::sync::Arc;

use extmem_error::{ExtmemResult, extmem_err};

pub use raw::*;

use crate::SparsePage;

mod raw;

/// The format used when a cache prefix does not name one.
pub const DEFAULT_FORMAT: &str = "raw";

/// The marker that introduces a format selector in a cache prefix, as in `train.cache.fmt-raw`.
pub const FORMAT_MARKER: &str = ".fmt-";

/// A codec that encodes [`SparsePage`]s to, and decodes them from, a byte stream.
///
/// A codec instance is owned by a single shard and may keep scratch buffers between calls.
pub trait PageFormat: Send + Debug {
    /// The identifier written at the head of every page file encoded with this format.
    fn name(&self) -> &str;

    /// Decode the next page into `page`, replacing its contents.
    ///
    /// Returns `false` on a clean end of stream.
    fn read(&mut self, page: &mut SparsePage, read: &mut dyn Read) -> ExtmemResult<bool>;

    fn write(&mut self, page: &SparsePage, write: &mut dyn Write) -> ExtmemResult<()>;
}

pub type PageFormatRef = Box<dyn PageFormat>;

/// Creates a fresh codec instance.
pub type PageFormatFactory = Arc<dyn Fn() -> PageFormatRef + Send + Sync>;

/// The set of page formats known to a cache, keyed by name.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: BTreeMap<String, PageFormatFactory>,
}

impl FormatRegistry {
    /// A registry with no formats at all.
    pub fn empty() -> Self {
        Self {
            formats: BTreeMap::new(),
        }
    }

    pub fn with_format(
        mut self,
        name: impl Into<String>,
        factory: impl Fn() -> PageFormatRef + Send + Sync + 'static,
    ) -> Self {
        self.register(name, factory);
        self
    }

    /// Register a format, replacing any previous format of the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> PageFormatRef + Send + Sync + 'static,
    ) {
        self.formats.insert(name.into(), Arc::new(factory));
    }

    /// Instantiate the format called `name`.
    pub fn create(&self, name: &str) -> ExtmemResult<PageFormatRef> {
        self.formats
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| {
                extmem_err!(
                    UnknownFormat: "unknown page format {name:?}, known formats are {:?}",
                    self.names().collect::<Vec<_>>()
                )
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.formats.keys().map(String::as_str)
    }

    /// Decide the row and column formats for a cache prefix.
    ///
    /// If `prefix` contains [`FORMAT_MARKER`], the text after its last occurrence is parsed as
    /// `row[-col]`; a missing column format falls back to the row format. Otherwise both are
    /// [`DEFAULT_FORMAT`]. The names are not checked against the registry here.
    pub fn decide_format(&self, prefix: &str) -> (String, String) {
        let Some((_, selector)) = prefix.rsplit_once(FORMAT_MARKER) else {
            return (DEFAULT_FORMAT.to_string(), DEFAULT_FORMAT.to_string());
        };
        match selector.split_once('-') {
            Some((row, col)) => (row.to_string(), col.to_string()),
            None => (selector.to_string(), selector.to_string()),
        }
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::empty().with_format(RAW_FORMAT, || Box::new(RawFormat::default()))
    }
}

impl Debug for FormatRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
