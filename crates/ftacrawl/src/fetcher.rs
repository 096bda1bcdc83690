use std::future::Future;

use crate::types::TaxonomyNode;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Node #{key} has no detail page")]
    MissingDetailPath { key: u64 },
    #[error("Invalid fetch configuration: {0}")]
    Config(String),
}

/// Source of detail pages and child listings for taxonomy nodes.
pub trait ContentFetcher {
    fn fetch_detail_html(
        &self,
        node: &TaxonomyNode,
    ) -> impl Future<Output = Result<String, FetchError>>;

    /// Children of `node`, or `None` when the listing is not an array.
    fn fetch_children(
        &self,
        node: &TaxonomyNode,
    ) -> impl Future<Output = Result<Option<Vec<TaxonomyNode>>, FetchError>>;
}
