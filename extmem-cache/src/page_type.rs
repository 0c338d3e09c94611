use std::fmt::{Display, Formatter};
use std::str::FromStr;

use extmem_error::{ExtmemError, ExtmemResult, extmem_bail};

/// The kinds of page file a cache can hold. Each is stored at `<prefix><suffix>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    /// Rows as parsed.
    Row,
    /// The transpose of each row batch: one row per column listing `(row id, value)`.
    Column,
    /// Like [`PageType::Column`], with every column's entries sorted by value.
    SortedColumn,
}

impl PageType {
    pub const ALL: [PageType; 3] = [PageType::Row, PageType::Column, PageType::SortedColumn];

    pub const fn suffix(self) -> &'static str {
        match self {
            PageType::Row => ".row.page",
            PageType::Column => ".col.page",
            PageType::SortedColumn => ".sorted.col.page",
        }
    }

    pub const fn column(sorted: bool) -> Self {
        if sorted {
            PageType::SortedColumn
        } else {
            PageType::Column
        }
    }

    /// The path of this page type's file for a shard prefix.
    pub fn shard_path(self, prefix: &str) -> String {
        format!("{prefix}{}", self.suffix())
    }
}

impl Display for PageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for PageType {
    type Err = ExtmemError;

    fn from_str(s: &str) -> ExtmemResult<Self> {
        match PageType::ALL.into_iter().find(|t| t.suffix() == s) {
            Some(page_type) => Ok(page_type),
            None => extmem_bail!(
                UnknownPageType: "{s:?}, expected one of .row.page, .col.page or .sorted.col.page"
            ),
        }
    }
}

impl TryFrom<&str> for PageType {
    type Error = ExtmemError;

    fn try_from(value: &str) -> ExtmemResult<Self> {
        value.parse()
    }
}
