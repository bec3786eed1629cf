//! Page arithmetic for paginating result sets.

use crate::clauses::Clauses;
use crate::core::{LiteQueryError, Result};

/// Page size used when the `rows` clause is absent
pub const DEFAULT_ENTRIES_PER_PAGE: u64 = 10;

/// The page a result set asks for: its number and size.
///
/// Both are at least 1; `PageRequest::new` is the only way to build one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    rows: u64,
}

impl PageRequest {
    pub fn new(page: u64, rows: u64) -> Result<Self> {
        if page == 0 {
            return Err(LiteQueryError::usage("pages are numbered from 1"));
        }
        if rows == 0 {
            return Err(LiteQueryError::usage("rows per page must be at least 1"));
        }
        Ok(PageRequest { page, rows })
    }

    /// Reads `page` and `rows` from the clauses.
    ///
    /// Returns `None` when the clauses do not paginate.
    pub fn from_clauses(clauses: &Clauses, default_rows: u64) -> Result<Option<Self>> {
        match clauses.page {
            Some(page) => PageRequest::new(page, clauses.rows.unwrap_or(default_rows)).map(Some),
            None => Ok(None),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn limit(&self) -> u64 {
        self.rows
    }

    /// Rows before the first entry of this page
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.rows)
    }
}

/// Position of one page within the full, unpaginated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    total_entries: u64,
    entries_per_page: u64,
    current_page: u64,
}

impl Pager {
    pub fn new(total_entries: u64, request: PageRequest) -> Self {
        Pager {
            total_entries,
            entries_per_page: request.rows,
            current_page: request.page,
        }
    }

    pub fn total_entries(&self) -> u64 {
        self.total_entries
    }

    pub fn entries_per_page(&self) -> u64 {
        self.entries_per_page
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn first_page(&self) -> u64 {
        1
    }

    pub fn last_page(&self) -> u64 {
        self.total_entries.div_ceil(self.entries_per_page).max(1)
    }

    pub fn skipped(&self) -> u64 {
        (self.current_page - 1).saturating_mul(self.entries_per_page)
    }

    /// Entries shown on the current page; zero past the last page.
    pub fn entries_on_this_page(&self) -> u64 {
        self.total_entries
            .saturating_sub(self.skipped())
            .min(self.entries_per_page)
    }

    /// 1-based index of the first entry on this page, 0 when it is empty
    pub fn first(&self) -> u64 {
        if self.entries_on_this_page() == 0 {
            0
        } else {
            self.skipped() + 1
        }
    }

    /// 1-based index of the last entry on this page, 0 when it is empty
    pub fn last(&self) -> u64 {
        if self.entries_on_this_page() == 0 {
            0
        } else {
            self.skipped() + self.entries_on_this_page()
        }
    }

    pub fn previous_page(&self) -> Option<u64> {
        (self.current_page > 1).then(|| self.current_page - 1)
    }

    pub fn next_page(&self) -> Option<u64> {
        (self.current_page < self.last_page()).then(|| self.current_page + 1)
    }
}
