//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    /// Largest page size a caller may request
    pub const MAX_PER_PAGE: u32 = 100;

    /// Page and page size clamped to sane bounds
    pub fn normalized(&self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// Row offset for SQL `OFFSET`
    pub fn offset(&self) -> i64 {
        let p = self.normalized();
        i64::from(p.page - 1) * i64::from(p.per_page)
    }

    /// Row count for SQL `LIMIT`
    pub fn limit(&self) -> i64 {
        i64::from(self.normalized().per_page)
    }

    /// Build the metadata block for a response
    pub fn meta(&self, total_items: u64) -> PaginationMeta {
        let p = self.normalized();
        let per_page = u64::from(p.per_page);
        let total_pages = total_items.div_ceil(per_page);
        PaginationMeta {
            page: p.page,
            per_page: p.per_page,
            total_items,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}
