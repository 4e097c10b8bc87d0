//! Memory service scopes/node types (spec.md §6 "Memory service").

use serde::{Deserialize, Serialize};

/// Scope of a memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryScope {
    Identity,
    Environment,
    Local,
}

/// Node type in the memory graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryNodeType {
    Channel,
    User,
    Concept,
    Agent,
}
