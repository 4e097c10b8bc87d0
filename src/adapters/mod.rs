//! Concrete implementations of the domain ports (spec.md §6): `memory` for
//! tests/dev, `sqlite` for production persistence, `console` for the
//! stdout-backed `CommunicationService` a CLI-mode deployment runs against.

pub mod console;
pub mod llm;
pub mod memory;
pub mod sqlite;
