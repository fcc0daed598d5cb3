//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! slices of nodes and return deterministic outputs suitable for tests.

pub mod candidate;
pub mod frontier;
pub mod index;
pub mod invariants;
pub mod selection;
pub mod types;
