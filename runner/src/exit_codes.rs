//! Stable exit codes for `machine` commands.

/// Run stopped cleanly (completed or interrupted), or the checked text is valid.
pub const OK: i32 = 0;
/// Invalid usage, configuration or environment (e.g. missing API key).
pub const INVALID: i32 = 1;
/// The run ended `failed`, or the checked text violates the constraint.
pub const FAILED: i32 = 2;
