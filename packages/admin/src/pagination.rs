//! Pagination: clamped parameters and the list envelope.

use serde::{Deserialize, Serialize};

/// Raw pagination query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Normalized pagination: page ≥ 1, pageSize clamped to [1, 100].
#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    pub page: u32,
    pub page_size: u32,
}

impl PageQuery {
    pub fn normalize(&self, default_page_size: u32) -> PageParams {
        PageParams {
            page: self.page.unwrap_or(1).max(1),
            page_size: self.page_size.unwrap_or(default_page_size).clamp(1, 100),
        }
    }
}

/// Pagination metadata on list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u32,
    pub page_size: u32,
    pub total: usize,
    pub total_pages: u32,
}

/// The `{data, pagination}` list envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    /// Slice a full result set down to one page.
    pub fn slice(items: Vec<T>, params: PageParams) -> Self {
        let total = items.len();
        let total_pages = ((total as u32).div_ceil(params.page_size)).max(1);
        let start = ((params.page - 1) * params.page_size) as usize;
        let data: Vec<T> = items
            .into_iter()
            .skip(start)
            .take(params.page_size as usize)
            .collect();
        Self {
            data,
            pagination: PageInfo {
                page: params.page,
                page_size: params.page_size,
                total,
                total_pages,
            },
        }
    }
}
