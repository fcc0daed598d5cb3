//! Conversational-tree engine for negotiation simulations.
//!
//! A case's background facts seed a branching dialogue tree that alternates
//! between two negotiating parties. Each generation round asks a model for a
//! 1 + 3 + 9 candidate subtree, which is then persisted under the current
//! frontier of the selected path. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (traversal, frontier search,
//!   candidate validation, selection checks). No I/O.
//! - **[`io`]**: Side-effecting collaborators (node store, model backend,
//!   prompt rendering, configuration).
//!
//! Orchestration modules ([`reader`], [`frontier`], [`generate`], [`writer`],
//! [`select`], [`continuation`], [`bookmarks`]) compose the two and are what
//! the CLI and any outer service call.

pub mod bookmarks;
pub mod continuation;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod frontier;
pub mod generate;
pub mod io;
pub mod logging;
pub mod reader;
pub mod select;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;
pub mod writer;
