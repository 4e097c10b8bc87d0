//! Adaptive content-filter capability (spec.md §6 "Filter / adaptive
//! filter service").

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FilterServiceError {
    #[error("filter backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait FilterService: Send + Sync {
    async fn add_filter_trigger(&self, trigger: &str, disposition: &str) -> Result<bool, FilterServiceError>;
}
