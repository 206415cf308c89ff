//! Page-result envelope.

use serde::{Deserialize, Serialize};

use crate::plan::Pagination;
use crate::sanitize::Row;

/// One page of sanitized rows plus navigation metadata.
///
/// `has_next` and `has_previous` derive only from `page` and
/// `total_pages`, never from whether `data` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub data: Vec<Row>,
    pub total_count: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageResult {
    /// Builds the envelope for `data` fetched with `pagination`.
    #[must_use]
    pub fn assemble(data: Vec<Row>, total_count: u64, pagination: &Pagination) -> Self {
        let total_pages = total_pages(total_count, pagination.limit);
        Self {
            data,
            total_count,
            page: pagination.page,
            limit: pagination.limit,
            total_pages,
            has_next: u64::from(pagination.page) < total_pages,
            has_previous: pagination.page > 1,
        }
    }
}

/// `ceil(total_count / limit)`; zero when there is nothing to page through.
#[must_use]
pub fn total_pages(total_count: u64, limit: u32) -> u64 {
    if limit == 0 {
        return 0;
    }
    total_count.div_ceil(u64::from(limit))
}
