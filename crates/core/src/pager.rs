//! Offset/limit pagination.

use serde::{Deserialize, Serialize};

/// Page size applied when a non-positive size is supplied.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// A page request: 1-based page number plus page size.
///
/// Zero values are normalized on read (page 1, [`DEFAULT_PAGE_SIZE`]) rather
/// than rejected, so a zero-initialized pager is always usable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    page: u32,
    page_size: u32,
}

impl Pager {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn page(&self) -> u32 {
        if self.page == 0 { 1 } else { self.page }
    }

    pub fn page_size(&self) -> u32 {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        }
    }

    /// Number of records to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.page_size())
    }

    /// Number of records per page.
    pub fn limit(&self) -> u64 {
        u64::from(self.page_size())
    }
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let pager = Pager::new(0, 0);
        assert_eq!(pager.page(), 1);
        assert_eq!(pager.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(pager.offset(), 0);
    }

    #[test]
    fn offset_is_zero_based() {
        let pager = Pager::new(3, 10);
        assert_eq!(pager.offset(), 20);
        assert_eq!(pager.limit(), 10);
    }
}
