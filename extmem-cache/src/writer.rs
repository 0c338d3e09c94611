use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use extmem_error::{ExtmemError, ExtmemResult, ResultExt, extmem_bail, extmem_err};
use extmem_io::write_string;
use extmem_page::{FormatRegistry, PageFormatRef, SparsePage};
use itertools::Itertools;

use crate::meta_file::create;

struct ShardWorker {
    path: PathBuf,
    submitter: Option<flume::Sender<SparsePage>>,
    thread: Option<JoinHandle<ExtmemResult<()>>>,
}

/// Writes pages round-robin across shard files, one worker thread per shard.
///
/// Page buffers are recycled: at most `max_buffered_pages` pages exist at once, and
/// [`PageWriter::alloc`] blocks until a worker hands one back.
pub struct PageWriter {
    workers: Vec<ShardWorker>,
    recycled: flume::Receiver<SparsePage>,
    allocated: usize,
    max_buffered_pages: usize,
    clock_ptr: usize,
}

impl PageWriter {
    /// Create every shard file and write its format identifier.
    ///
    /// `shard_paths[i]` is encoded with the format registered as `shard_formats[i]`.
    pub fn try_new(
        shard_paths: &[impl AsRef<Path>],
        shard_formats: &[impl AsRef<str>],
        registry: &FormatRegistry,
        max_buffered_pages: usize,
    ) -> ExtmemResult<Self> {
        if shard_paths.is_empty() || shard_paths.len() != shard_formats.len() {
            extmem_bail!(
                "expected one format per shard, got {} shards and {} formats",
                shard_paths.len(),
                shard_formats.len()
            );
        }
        if max_buffered_pages == 0 {
            extmem_bail!("a page writer needs at least one page buffer");
        }

        let formats = shard_formats
            .iter()
            .map(|name| registry.create(name.as_ref()))
            .collect::<ExtmemResult<Vec<_>>>()?;

        let (recycle, recycled) = flume::unbounded();
        // Dropping a partially built writer joins the workers started so far.
        let mut writer = Self {
            workers: Vec::with_capacity(shard_paths.len()),
            recycled,
            allocated: 0,
            max_buffered_pages,
            clock_ptr: 0,
        };
        for (shard, ((path, name), format)) in
            shard_paths.iter().zip(shard_formats).zip(formats).enumerate()
        {
            let path = path.as_ref().to_path_buf();
            let mut write = BufWriter::new(create(&path)?);
            write_string(&mut write, name.as_ref())?;

            let (submitter, pages) = flume::unbounded();
            let thread = std::thread::Builder::new()
                .name(format!("page-writer-{shard}"))
                .spawn({
                    let recycle = recycle.clone();
                    move || run_worker(write, format, &pages, &recycle)
                })?;
            log::debug!("writing {} pages to {}", name.as_ref(), path.display());

            writer.workers.push(ShardWorker {
                path,
                submitter: Some(submitter),
                thread: Some(thread),
            });
        }

        Ok(writer)
    }

    pub fn num_shards(&self) -> usize {
        self.workers.len()
    }

    /// An empty page buffer, blocking while all `max_buffered_pages` buffers are in flight.
    pub fn alloc(&mut self) -> ExtmemResult<SparsePage> {
        if let Ok(page) = self.recycled.try_recv() {
            return Ok(page);
        }
        if self.allocated < self.max_buffered_pages {
            self.allocated += 1;
            return Ok(SparsePage::default());
        }
        self.recycled
            .recv()
            .map_err(|_| extmem_err!("all page writer threads have stopped"))
    }

    /// Queue `page` for writing. The `j`-th page pushed goes to shard `j mod num_shards`.
    pub fn push_write(&mut self, page: SparsePage) -> ExtmemResult<()> {
        let worker = &self.workers[self.clock_ptr];
        let sent = worker
            .submitter
            .as_ref()
            .is_some_and(|submitter| submitter.send(page).is_ok());
        if !sent {
            extmem_bail!("page writer for {} has stopped", worker.path.display());
        }
        self.clock_ptr = (self.clock_ptr + 1) % self.workers.len();
        Ok(())
    }

    /// Wait for every queued page to be written and flushed, returning the first error.
    pub fn finish(mut self) -> ExtmemResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ExtmemResult<()> {
        for worker in &mut self.workers {
            worker.submitter.take();
        }

        let mut result = Ok(());
        for worker in &mut self.workers {
            let Some(thread) = worker.thread.take() else {
                continue;
            };
            let joined = thread
                .join()
                .map_err(|_| extmem_err!(AssertionFailed: "page writer thread panicked"));
            let outcome = ResultExt::flatten(joined)
                .map_err(|e| e.with_context(format!("writing {}", worker.path.display())));
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }
}

impl Drop for PageWriter {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("page writer failed: {e}");
        }
    }
}

/// Encode pages in submission order. After the first failure pages are still recycled so the
/// producer never blocks on a buffer that will not come back.
fn run_worker(
    mut write: BufWriter<File>,
    mut format: PageFormatRef,
    pages: &flume::Receiver<SparsePage>,
    recycle: &flume::Sender<SparsePage>,
) -> ExtmemResult<()> {
    let mut result = Ok(());
    for mut page in pages.iter() {
        if result.is_ok() {
            result = format.write(&page, &mut write);
        }
        page.clear();
        // The writer may already be gone.
        recycle.send(page).ok();
    }
    result?;
    write.flush().map_err(ExtmemError::from)
}

impl std::fmt::Debug for PageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageWriter")
            .field(
                "shards",
                &self.workers.iter().map(|w| w.path.display()).join(", "),
            )
            .field("allocated", &self.allocated)
            .field("max_buffered_pages", &self.max_buffered_pages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use extmem_io::read_string;
    use extmem_page::{Entry, PageFormat, RawFormat};

    use super::*;

    fn single_row(value: u32) -> SparsePage {
        SparsePage::from_rows([[Entry::new(value, value as f32)]])
    }

    fn read_shard(path: &Path) -> (String, Vec<u32>) {
        let mut read = Cursor::new(fs::read(path).unwrap());
        let name = read_string(&mut read).unwrap();
        let mut format = RawFormat::default();
        let mut page = SparsePage::default();
        let mut values = Vec::new();
        while format.read(&mut page, &mut read).unwrap() {
            values.push(page.data[0].index);
        }
        (name, values)
    }

    #[test]
    fn pages_are_striped_round_robin() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..3).map(|i| dir.path().join(format!("s{i}.row.page"))).collect();
        let mut writer =
            PageWriter::try_new(&paths, &["raw"; 3], &FormatRegistry::default(), 2).unwrap();

        for value in 0..7 {
            let mut page = writer.alloc().unwrap();
            assert!(page.is_empty());
            page.push_page(&single_row(value));
            writer.push_write(page).unwrap();
        }
        writer.finish().unwrap();

        assert_eq!(read_shard(&paths[0]), ("raw".to_string(), vec![0, 3, 6]));
        assert_eq!(read_shard(&paths[1]), ("raw".to_string(), vec![1, 4]));
        assert_eq!(read_shard(&paths[2]), ("raw".to_string(), vec![2, 5]));
    }

    #[test]
    fn empty_writer_leaves_only_the_format_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.row.page");
        drop(PageWriter::try_new(&[&path], &["raw"], &FormatRegistry::default(), 6).unwrap());
        assert_eq!(read_shard(&path), ("raw".to_string(), vec![]));
    }

    #[test]
    fn unknown_format_creates_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.row.page");
        let err =
            PageWriter::try_new(&[&path], &["lz4"], &FormatRegistry::default(), 6).unwrap_err();
        assert!(matches!(err, ExtmemError::UnknownFormat(..)));
        assert!(!path.exists());
    }

    #[test]
    fn alloc_stays_within_the_buffer_budget() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..2).map(|i| dir.path().join(format!("s{i}.row.page"))).collect();
        let mut writer =
            PageWriter::try_new(&paths, &["raw"; 2], &FormatRegistry::default(), 3).unwrap();

        for value in 0..50 {
            let mut page = writer.alloc().unwrap();
            page.push_page(&single_row(value));
            writer.push_write(page).unwrap();
            assert!(writer.allocated <= 3);
        }
        writer.finish().unwrap();

        let written: Vec<u32> = paths.iter().flat_map(|p| read_shard(p).1).collect();
        assert_eq!(written.len(), 50);
    }

    #[test]
    fn failed_shard_joins_the_started_workers() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("s0.row.page");
        let missing = dir.path().join("missing").join("s1.row.page");

        let err = PageWriter::try_new(&[&first, &missing], &["raw"; 2], &FormatRegistry::default(), 6)
            .unwrap_err();
        assert!(matches!(err.root(), ExtmemError::IOError(..)));
        // The first worker has flushed its tag by the time the error is returned.
        assert_eq!(read_shard(&first), ("raw".to_string(), vec![]));
    }

    #[test]
    fn mismatched_formats_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.row.page");
        assert!(PageWriter::try_new(&[&path], &["raw", "raw"], &FormatRegistry::default(), 6).is_err());
    }
}
