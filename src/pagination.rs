//! Page windows for the company-scoped list endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PER_PAGE: i64 = 25;
pub const MAX_PER_PAGE: i64 = 100;

/// `?page=&per_page=` query. Out-of-range values are clamped, never rejected.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 1-based page number.
    #[param(minimum = 1, default = 1)]
    #[serde(default)]
    pub page: Option<i64>,

    #[param(minimum = 1, maximum = 100, default = 25)]
    #[serde(default)]
    pub per_page: Option<i64>,
}

impl PaginationParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// `(LIMIT, OFFSET)` for the Diesel query.
    pub fn limit_offset(&self) -> (i64, i64) {
        let per_page = self.per_page();
        (per_page, (self.page() - 1).saturating_mul(per_page))
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next: bool,
}

impl PaginationMeta {
    pub fn for_params(params: &PaginationParams, total_count: i64) -> Self {
        let page = params.page();
        let per_page = params.per_page();
        let total_pages = ((total_count + per_page - 1) / per_page).max(1);

        Self {
            page,
            per_page,
            total_count,
            total_pages,
            has_next: page < total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn from_params(data: Vec<T>, params: &PaginationParams, total_count: i64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::for_params(params, total_count),
        }
    }
}
