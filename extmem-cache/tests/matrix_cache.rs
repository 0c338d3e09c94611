use extmem_cache::{CacheOptions, PageSource, PageType};
use extmem_page::{Entry, SparsePage};

fn page(rows: &[&[(u32, f32)]]) -> SparsePage {
    SparsePage::from_rows(
        rows.iter()
            .map(|row| row.iter().map(|&(index, fvalue)| Entry::new(index, fvalue))),
    )
}

/// Every page of one pass, copied out of the cursor.
fn collect_pages(spec: &str, page_type: PageType) -> Vec<SparsePage> {
    let mut source = PageSource::open(spec, page_type, &CacheOptions::default()).unwrap();
    let mut pages = Vec::new();
    while source.next() {
        pages.push(source.value().unwrap().clone());
    }
    pages
}

#[cfg(test)]
mod tests {
    use std::fs;

    use extmem_cache::{
        InMemoryMatrix, RowBatchSource, cache_exists, create_column_page, create_page_from_matrix,
        create_row_page, create_row_page_from_matrix, read_meta_file,
    };
    use extmem_error::ExtmemError;
    use extmem_io::read_string;
    use extmem_page::{FormatRegistry, MetaInfo, RawFormat, RowBlockContainer, RowRecord};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    fn spec(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).display().to_string()
    }

    #[rstest]
    fn sorted_column_page_from_a_matrix(dir: TempDir) {
        let spec = spec(&dir, "m.cache");
        let mut matrix = InMemoryMatrix::from_batches(vec![page(&[
            &[(0, 1.0), (2, 2.0)],
            &[(1, 3.0)],
        ])]);
        assert_eq!(matrix.info().num_col, 3);

        create_page_from_matrix(&mut matrix, &spec, ".sorted.col.page", &CacheOptions::default())
            .unwrap();
        assert!(cache_exists(&spec, ".sorted.col.page").unwrap());

        let pages = collect_pages(&spec, PageType::SortedColumn);
        assert_eq!(pages.len(), 1);
        let columns = &pages[0];
        assert_eq!(columns.size(), 3);
        assert_eq!(columns.row(0), &[Entry::new(0, 1.0)]);
        assert_eq!(columns.row(1), &[Entry::new(1, 3.0)]);
        assert_eq!(columns.row(2), &[Entry::new(0, 2.0)]);
    }

    #[rstest]
    #[case(false, &[Entry::new(0, 3.0), Entry::new(1, 1.0), Entry::new(2, 2.0)])]
    #[case(true, &[Entry::new(1, 1.0), Entry::new(2, 2.0), Entry::new(0, 3.0)])]
    fn column_entries_are_sorted_on_request(
        dir: TempDir,
        #[case] sorted: bool,
        #[case] expected: &[Entry],
    ) {
        let spec = spec(&dir, "m.cache");
        let mut matrix =
            InMemoryMatrix::from_batches(vec![page(&[&[(0, 3.0)], &[(0, 1.0)], &[(0, 2.0)]])]);
        create_column_page(&mut matrix, &spec, sorted, &CacheOptions::default()).unwrap();

        let pages = collect_pages(&spec, PageType::column(sorted));
        assert_eq!(pages[0].row(0), expected);
    }

    #[rstest]
    fn unknown_page_type_writes_nothing(dir: TempDir) {
        let spec = spec(&dir, "m.cache");
        let mut matrix = InMemoryMatrix::from_batches(vec![page(&[&[(0, 1.0)]])]);

        let err = create_page_from_matrix(&mut matrix, &spec, ".bogus", &CacheOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExtmemError::UnknownPageType(..)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn metadata_is_copied_verbatim(dir: TempDir) {
        let spec = format!("{}:{}", spec(&dir, "a.cache"), spec(&dir, "b.cache"));
        let info = MetaInfo {
            num_row: 3,
            num_col: 4,
            num_nonzero: 3,
            labels: vec![1.0, 0.0, 1.0],
            weights: vec![2.0, 1.0, 1.0],
            base_margin: vec![0.5, 0.5, 0.5],
            ..Default::default()
        };
        let mut matrix = InMemoryMatrix::new(
            info.clone(),
            vec![page(&[&[(3, 1.0)], &[(0, 1.0)]]), page(&[&[(1, 1.0)]])],
        );
        create_row_page_from_matrix(&mut matrix, &spec, &CacheOptions::default()).unwrap();

        assert_eq!(read_meta_file(dir.path().join("a.cache")).unwrap(), info);
        let pages = collect_pages(&spec, PageType::Row);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0], page(&[&[(3, 1.0)], &[(0, 1.0)], &[(1, 1.0)]]));
    }

    #[rstest]
    fn matrix_metadata_is_written_unchecked(dir: TempDir) {
        let spec = spec(&dir, "m.cache");
        let info = MetaInfo {
            num_row: 2,
            num_col: 1,
            num_nonzero: 2,
            qids: vec![5],
            ..Default::default()
        };
        let mut matrix = InMemoryMatrix::new(info.clone(), vec![page(&[&[(0, 1.0)], &[(0, 2.0)]])]);
        create_row_page_from_matrix(&mut matrix, &spec, &CacheOptions::default()).unwrap();

        assert_eq!(read_meta_file(dir.path().join("m.cache")).unwrap(), info);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn column_pages_use_the_row_format(dir: TempDir, #[case] sorted: bool) {
        let spec = spec(&dir, "m.cache.fmt-copy-raw");
        let registry = FormatRegistry::default().with_format("copy", || Box::new(RawFormat::default()));
        let options = CacheOptions::default().with_registry(registry.into());
        let mut matrix = InMemoryMatrix::from_batches(vec![page(&[&[(0, 1.0), (1, 2.0)]])]);
        create_column_page(&mut matrix, &spec, sorted, &options).unwrap();

        let page_type = PageType::column(sorted);
        let bytes = fs::read(page_type.shard_path(&spec)).unwrap();
        assert_eq!(read_string(&mut bytes.as_slice()).unwrap(), "copy");

        let mut source = PageSource::open(&spec, page_type, &options).unwrap();
        assert!(source.next());
        assert_eq!(source.value().unwrap().size(), 2);
    }

    #[rstest]
    fn transposed_rows_keep_their_global_ids(dir: TempDir) {
        let spec = spec(&dir, "m.cache");
        let mut matrix = InMemoryMatrix::from_batches(vec![
            page(&[&[(0, 1.0)], &[(1, 2.0)]]),
            page(&[&[(1, 3.0)]]),
        ]);
        let options = CacheOptions::default().with_page_size_target(1);
        create_column_page(&mut matrix, &spec, false, &options).unwrap();

        // One column page per batch, each with a row per column.
        let pages = collect_pages(&spec, PageType::Column);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].row(1), &[Entry::new(1, 2.0)]);
        assert!(pages[1].row(0).is_empty());
        assert_eq!(pages[1].row(1), &[Entry::new(2, 3.0)]);
        assert_eq!(pages[1].base_rowid, 2);
    }

    #[rstest]
    fn row_cache_converts_to_a_column_cache(dir: TempDir) {
        let spec = format!("{}:{}", spec(&dir, "a.cache"), spec(&dir, "b.cache"));
        let rows: Vec<_> = (0..40u32)
            .map(|i| RowRecord::new([(i % 5, i as f32), (5 + i % 2, 1.0)]).with_label(1.0))
            .collect();
        let mut parser = RowBlockContainer::from_rows(&rows, 8).unwrap();
        let options = CacheOptions::default().with_page_size_target(1);
        let info = create_row_page(&mut parser, &spec, &options).unwrap();

        let mut source = PageSource::open(&spec, PageType::Row, &options).unwrap();
        let mut expected = Vec::new();
        while let Some(batch) = source.next_batch().unwrap() {
            let mut columns = batch.transpose(7).unwrap();
            columns.sort_rows();
            expected.push(columns);
        }

        create_column_page(&mut source, &spec, true, &options).unwrap();
        drop(source);

        assert!(cache_exists(&spec, ".row.page").unwrap());
        assert!(cache_exists(&spec, ".sorted.col.page").unwrap());
        assert_eq!(read_meta_file(dir.path().join("a.cache")).unwrap(), info);

        let pages = collect_pages(&spec, PageType::SortedColumn);
        assert_eq!(pages.len(), expected.len());
        for (page, mut expected) in pages.into_iter().zip(expected) {
            expected.base_rowid = page.base_rowid;
            assert_eq!(page, expected);
        }
    }
}
