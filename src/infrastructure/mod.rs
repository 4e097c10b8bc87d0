//! Ambient stack (SPEC_FULL.md §6): configuration loading and logging setup.
//! Everything here is infrastructure the core domain/services never import
//! directly — only `main.rs`/`cli` wire it in.

pub mod config;
pub mod logging;
