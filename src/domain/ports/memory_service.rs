//! Memory service capability (spec.md §6 "Memory service").

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{MemoryNodeType, MemoryScope};

#[derive(Debug, Clone)]
pub struct MemoryNodeRef {
    pub node_type: MemoryNodeType,
    pub key: String,
}

#[derive(Error, Debug, Clone)]
pub enum MemoryServiceError {
    #[error("memory backend error: {0}")]
    Backend(String),

    #[error("node not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn recall(&self, node: MemoryNodeRef) -> Result<serde_json::Value, MemoryServiceError>;

    async fn memorize(
        &self,
        key_or_nick: &str,
        channel: &str,
        metadata: serde_json::Value,
        is_correction: bool,
    ) -> Result<(), MemoryServiceError>;

    async fn forget(&self, key: &str, scope: MemoryScope, reason: &str) -> Result<(), MemoryServiceError>;

    async fn export_identity_context(&self) -> Result<String, MemoryServiceError>;
}
