//! Page/limit handling shared by every list endpoint.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT:     u32 = 100;

/// `?page=&limit=` as sent by the client. Missing or zero values fall back to defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page:  Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page:  u32,
    pub limit: u32,
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        Page::new(q.page.unwrap_or(1), q.limit.unwrap_or(DEFAULT_LIMIT))
    }
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        let page  = page.max(1);
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit.min(MAX_LIMIT) };
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        let total = total.max(0);
        let limit = i64::from(self.limit);
        let total_pages = (total + limit - 1) / limit;
        PageMeta {
            page:        self.page,
            limit:       self.limit,
            total,
            total_pages,
            has_next:    i64::from(self.page) < total_pages,
            has_prev:    self.page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page:        u32,
    pub limit:       u32,
    pub total:       i64,
    pub total_pages: i64,
    pub has_next:    bool,
    pub has_prev:    bool,
}
