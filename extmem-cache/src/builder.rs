use std::mem;
use std::path::Path;
use std::time::{Duration, Instant};

use extmem_error::{ExtmemResult, extmem_err};
use extmem_page::{MetaInfo, RowBlock, RowBlockParser, SparsePage};
use humansize::{DECIMAL, format_size};

use crate::meta_file::save_meta_file;
use crate::{CacheOptions, PageType, PageWriter, RowBatchSource, cache_shards, write_meta_file};

/// Accumulates rows into pages and hands full pages to a [`PageWriter`].
struct PageSink {
    writer: PageWriter,
    page: SparsePage,
    page_size_target: usize,
    bytes_written: usize,
    start: Instant,
}

impl PageSink {
    fn try_new(prefixes: &[String], page_type: PageType, options: &CacheOptions) -> ExtmemResult<Self> {
        let paths: Vec<String> = prefixes.iter().map(|p| page_type.shard_path(p)).collect();
        // Every page type is written with the row half of the format selector.
        let formats: Vec<String> = prefixes
            .iter()
            .map(|p| options.registry.decide_format(p).0)
            .collect();

        let mut writer =
            PageWriter::try_new(&paths, &formats, &options.registry, options.max_buffered_pages)?;
        let page = writer.alloc()?;
        Ok(Self {
            writer,
            page,
            page_size_target: options.page_size_target,
            bytes_written: 0,
            start: Instant::now(),
        })
    }

    /// Write the current page if it has reached the target size. Returns whether it did.
    fn flush_if_full(&mut self) -> ExtmemResult<bool> {
        let cost = self.page.mem_cost_bytes();
        if cost < self.page_size_target {
            return Ok(false);
        }
        self.bytes_written += cost;
        self.writer.push_write(mem::take(&mut self.page))?;
        self.page = self.writer.alloc()?;
        Ok(true)
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn progress(&self) -> String {
        progress(self.bytes_written, self.elapsed())
    }

    /// Write any trailing rows and wait for every shard to be flushed.
    fn finish(mut self) -> ExtmemResult<()> {
        if !self.page.is_empty() {
            self.writer.push_write(mem::take(&mut self.page))?;
        }
        self.writer.finish()
    }
}

/// Write rate and total, both in decimal byte units.
fn progress(bytes_written: usize, elapsed: Duration) -> String {
    let millis = elapsed.as_millis().max(1);
    let rate = u64::try_from(bytes_written as u128 * 1000 / millis).unwrap_or(u64::MAX);
    format!(
        "{}/s, {} written",
        format_size(rate, DECIMAL),
        format_size(bytes_written, DECIMAL)
    )
}

/// Tracks query-group boundaries across row blocks.
#[derive(Debug, Default)]
struct GroupTracker {
    last_group_id: Option<u64>,
    group_size: u32,
}

impl GroupTracker {
    fn observe(&mut self, qids: &[u64], group_ptr: &mut Vec<u32>) -> ExtmemResult<()> {
        for &qid in qids {
            if self.last_group_id != Some(qid) {
                group_ptr.push(self.group_size);
            }
            self.last_group_id = Some(qid);
            self.group_size = self
                .group_size
                .checked_add(1)
                .ok_or_else(|| extmem_err!(GroupInvariant: "too many rows for 32-bit group pointers"))?;
        }
        Ok(())
    }

    fn close(&self, group_ptr: &mut Vec<u32>) {
        if self.last_group_id.is_some()
            && group_ptr.last().is_some_and(|&last| self.group_size > last)
        {
            group_ptr.push(self.group_size);
        }
    }
}

fn accumulate_info(info: &mut MetaInfo, block: &RowBlock<'_>) {
    if let Some(labels) = block.label {
        info.labels.extend_from_slice(labels);
    }
    if let Some(weights) = block.weight {
        info.weights.extend_from_slice(weights);
    }
    if let Some(qids) = block.qid {
        info.qids.extend_from_slice(qids);
    }
    info.num_row += block.size as u64;
    info.num_nonzero += block.num_nonzero() as u64;
    if let Some(max_index) = block.max_index() {
        info.num_col = info.num_col.max(u64::from(max_index) + 1);
    }
}

/// Build a row-page cache from a streaming parser, returning the metadata that was written.
///
/// Labels, weights, query ids and counts are gathered from the blocks as they stream past, and
/// the metadata file at the first shard prefix is written last.
pub fn create_row_page<P: RowBlockParser + ?Sized>(
    parser: &mut P,
    cache_info: &str,
    options: &CacheOptions,
) -> ExtmemResult<MetaInfo> {
    let page_type = PageType::Row;
    let prefixes = cache_shards(cache_info)?;
    let mut sink = PageSink::try_new(&prefixes, page_type, options)?;

    let mut info = MetaInfo::default();
    let mut groups = GroupTracker::default();
    let mut next_tick = options.progress_interval;

    parser.before_first()?;
    while let Some(block) = parser.next_block()? {
        accumulate_info(&mut info, &block);
        if let Some(qids) = block.qid {
            groups.observe(qids, &mut info.group_ptr)?;
        }
        sink.page.push_block(&block);

        if sink.flush_if_full()? && sink.elapsed() >= next_tick {
            log::info!("Writing {page_type} to {cache_info} in {}", sink.progress());
            next_tick += options.progress_interval;
        }
    }
    groups.close(&mut info.group_ptr);
    sink.finish()?;

    write_meta_file(&prefixes[0], &info)?;
    log::info!("Finished writing to {}", prefixes[0]);
    Ok(info)
}

/// Build a cache of `page_type` pages from a materialized matrix.
///
/// Row pages copy the batches; column pages hold the transpose of each batch, sorted by value for
/// `.sorted.col.page`. The source's metadata is written unchanged and is not validated.
pub fn create_page_from_matrix<S: RowBatchSource + ?Sized>(
    source: &mut S,
    cache_info: &str,
    page_type: &str,
    options: &CacheOptions,
) -> ExtmemResult<()> {
    let page_type: PageType = page_type.parse()?;
    let prefixes = cache_shards(cache_info)?;
    let info = source.info().clone();
    let num_col = usize::try_from(info.num_col)
        .map_err(|_| extmem_err!("{} columns do not fit in memory", info.num_col))?;

    let mut sink = PageSink::try_new(&prefixes, page_type, options)?;
    source.before_first()?;
    while let Some(batch) = source.next_batch()? {
        match page_type {
            PageType::Row => sink.page.push_page(batch),
            PageType::Column => sink.page.push_page(&batch.transpose(num_col)?),
            PageType::SortedColumn => {
                let mut columns = batch.transpose(num_col)?;
                columns.sort_rows();
                sink.page.push_page(&columns);
            }
        }

        if sink.flush_if_full()? {
            log::info!("Writing to {cache_info} in {}", sink.progress());
        }
    }
    sink.finish()?;

    save_meta_file(Path::new(&prefixes[0]), &info)?;
    log::info!("Finished writing to {}", prefixes[0]);
    Ok(())
}

pub fn create_row_page_from_matrix<S: RowBatchSource + ?Sized>(
    source: &mut S,
    cache_info: &str,
    options: &CacheOptions,
) -> ExtmemResult<()> {
    create_page_from_matrix(source, cache_info, PageType::Row.suffix(), options)
}

pub fn create_column_page<S: RowBatchSource + ?Sized>(
    source: &mut S,
    cache_info: &str,
    sorted: bool,
    options: &CacheOptions,
) -> ExtmemResult<()> {
    create_page_from_matrix(source, cache_info, PageType::column(sorted).suffix(), options)
}
