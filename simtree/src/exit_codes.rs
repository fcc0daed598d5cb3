//! Stable exit codes for `simtree` CLI commands.

use crate::error::ErrorKind;

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid usage, configuration, or a rejected selection/generation.
pub const INVALID: i32 = 1;
/// Case, tree, node, or bookmark does not exist.
pub const NOT_FOUND: i32 = 2;
/// The model backend failed or timed out.
pub const UPSTREAM: i32 = 3;
/// The node store could not be read or written.
pub const STORAGE: i32 = 4;

/// Exit code reported for an engine error of the given kind.
pub fn for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound => NOT_FOUND,
        ErrorKind::Validation => INVALID,
        ErrorKind::Upstream => UPSTREAM,
        ErrorKind::Storage => STORAGE,
    }
}
