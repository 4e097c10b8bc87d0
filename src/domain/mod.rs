//! Domain layer: models and ports. No I/O, no framework dependencies
//! beyond serde/chrono/uuid — mirrors the teacher's hexagonal layout.

pub mod errors;
pub mod models;
pub mod ports;
