use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::PathBuf;

use extmem_error::{ExtmemResult, extmem_err};
use extmem_io::{Prefetcher, Producer, read_string};
use extmem_page::{MetaInfo, PageFormatRef, SparsePage};

use crate::meta_file::{open, read_meta_file};
use crate::{CacheOptions, PageType, cache_shards};

/// Decodes the pages of one shard file on its prefetch thread.
struct ShardReader {
    path: PathBuf,
    read: BufReader<File>,
    format: PageFormatRef,
    /// The offset of the first page, just past the format identifier.
    fbegin: u64,
}

impl Producer<SparsePage> for ShardReader {
    fn produce(&mut self, slot: &mut SparsePage) -> ExtmemResult<bool> {
        self.format
            .read(slot, &mut self.read)
            .map_err(|e| e.with_context(format!("reading {}", self.path.display())))
    }

    fn rewind(&mut self) -> ExtmemResult<()> {
        self.read.seek(SeekFrom::Start(self.fbegin))?;
        Ok(())
    }
}

fn open_shard(path: PathBuf, options: &CacheOptions) -> ExtmemResult<ShardReader> {
    let mut read = BufReader::new(open(&path)?);
    let name = read_string(&mut read).map_err(|e| {
        extmem_err!(BadPageHeader: "invalid page format header in {}: {e}", path.display())
    })?;
    let format = options
        .registry
        .create(&name)
        .map_err(|e| e.with_context(format!("opening {}", path.display())))?;
    let fbegin = read.stream_position()?;
    Ok(ShardReader {
        path,
        read,
        format,
        fbegin,
    })
}

/// A restartable cursor over the pages of a sharded cache.
///
/// Pages are taken from the shards in strict rotation, `0, 1, .., k - 1, 0, ..`, and each page's
/// `base_rowid` is set to the number of rows yielded before it in the current pass. A pass ends at
/// the first shard that runs out of pages.
pub struct PageSource {
    info: MetaInfo,
    page_type: PageType,
    shards: Vec<Prefetcher<SparsePage>>,
    page: Option<SparsePage>,
    base_rowid: u64,
    clock_ptr: usize,
}

impl PageSource {
    /// Open the cache described by `cache_info`, reading its metadata and starting a prefetch
    /// thread per shard.
    pub fn open(cache_info: &str, page_type: PageType, options: &CacheOptions) -> ExtmemResult<Self> {
        let prefixes = cache_shards(cache_info)?;
        let info = read_meta_file(&prefixes[0])?;

        let shards = prefixes
            .iter()
            .enumerate()
            .map(|(i, prefix)| {
                let reader = open_shard(page_type.shard_path(prefix).into(), options)?;
                Prefetcher::try_new(format!("page-source-{i}"), options.prefetch_capacity, reader)
            })
            .collect::<ExtmemResult<Vec<_>>>()?;
        log::debug!(
            "opened {} cache {cache_info} with {} shards and {} rows",
            page_type,
            shards.len(),
            info.num_row
        );

        Ok(Self {
            info,
            page_type,
            shards,
            page: None,
            base_rowid: 0,
            clock_ptr: 0,
        })
    }

    /// Advance to the next page. Returns `false` once the pass is over.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        self.recycle_current();
        match self.shards[self.clock_ptr].next() {
            Some(mut page) => {
                page.base_rowid = self.base_rowid;
                self.base_rowid += page.size() as u64;
                self.clock_ptr = (self.clock_ptr + 1) % self.shards.len();
                self.page = Some(page);
                true
            }
            None => false,
        }
    }

    /// Restart from the first page of the first shard.
    pub fn before_first(&mut self) {
        self.recycle_current();
        self.base_rowid = 0;
        self.clock_ptr = 0;
        for shard in &mut self.shards {
            shard.before_first();
        }
    }

    /// The page the cursor is on, if the last call to [`PageSource::next`] succeeded.
    pub fn value(&self) -> Option<&SparsePage> {
        self.page.as_ref()
    }

    pub fn info(&self) -> &MetaInfo {
        &self.info
    }

    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// The current page came from the shard just behind the clock.
    fn recycle_current(&mut self) {
        if let Some(page) = self.page.take() {
            let n = self.shards.len();
            self.shards[(self.clock_ptr + n - 1) % n].recycle(page);
        }
    }
}

impl Debug for PageSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSource")
            .field("page_type", &self.page_type)
            .field("num_shards", &self.shards.len())
            .field("base_rowid", &self.base_rowid)
            .field("clock_ptr", &self.clock_ptr)
            .finish()
    }
}
