use std::sync::Arc;
use std::time::Duration;

use extmem_io::DEFAULT_PREFETCH_CAPACITY;
use extmem_page::FormatRegistry;

/// Pages are flushed once their memory cost reaches this many bytes.
pub const DEFAULT_PAGE_SIZE_TARGET: usize = 32 << 20;

/// The number of page buffers a [`PageWriter`](crate::PageWriter) keeps in flight.
pub const DEFAULT_MAX_BUFFERED_PAGES: usize = 6;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(4);

/// Options shared by cache builders and page sources.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub page_size_target: usize,
    pub max_buffered_pages: usize,
    /// The number of decoded pages each shard may buffer ahead of the reader.
    pub prefetch_capacity: usize,
    /// The minimum time between progress lines of the streaming builder.
    pub progress_interval: Duration,
    pub registry: Arc<FormatRegistry>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            page_size_target: DEFAULT_PAGE_SIZE_TARGET,
            max_buffered_pages: DEFAULT_MAX_BUFFERED_PAGES,
            prefetch_capacity: DEFAULT_PREFETCH_CAPACITY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            registry: Arc::new(FormatRegistry::default()),
        }
    }
}

impl CacheOptions {
    pub fn with_page_size_target(mut self, page_size_target: usize) -> Self {
        self.page_size_target = page_size_target;
        self
    }

    pub fn with_max_buffered_pages(mut self, max_buffered_pages: usize) -> Self {
        self.max_buffered_pages = max_buffered_pages;
        self
    }

    pub fn with_prefetch_capacity(mut self, prefetch_capacity: usize) -> Self {
        self.prefetch_capacity = prefetch_capacity;
        self
    }

    pub fn with_progress_interval(mut self, progress_interval: Duration) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    pub fn with_registry(mut self, registry: Arc<FormatRegistry>) -> Self {
        self.registry = registry;
        self
    }
}
