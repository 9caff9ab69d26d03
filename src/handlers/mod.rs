//! REST read API (E5, SPEC_FULL.md §4 E5): thin axum handlers over the
//! core's read-only query methods. One file per resource, the way the
//! teacher lays out `handlers/services.rs`, `handlers/alerts.rs`, etc.

pub mod attributes;
pub mod health;
pub mod logs;
pub mod metrics;
pub mod overview;
pub mod sessions;
pub mod spans;

use serde::Deserialize;

use crate::store::ListFilter;

/// Query parameters shared by every `List*` read contract (spec §6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub service: Option<String>,
    pub min_cardinality: Option<u64>,
    pub min_samples: Option<u64>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<ListParams> for ListFilter {
    fn from(params: ListParams) -> Self {
        ListFilter {
            service: params.service,
            min_cardinality: params.min_cardinality,
            min_samples: params.min_samples,
            search: params.search,
            limit: params.limit,
            offset: params.offset,
        }
    }
}
