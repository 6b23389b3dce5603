//! Constraint-enforcing streaming runner ("La Machine").
//!
//! A language model streams text while a formal writing constraint (lipogram,
//! tautogram, snowball...) is enforced on every chunk. On the first violation
//! the runner rolls back to the longest valid prefix, snapped to a word
//! boundary, and in hard mode retries from there. The crate enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic text logic (constraints, prefix search,
//!   rollback, retry policy). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config files, the HTTP generator,
//!   prompt rendering, transcripts). Isolated to enable scripting in tests.
//!
//! Orchestration modules ([`runner`], [`word_by_word`], [`check`]) coordinate
//! core logic with I/O to implement the CLI commands.

pub mod check;
pub mod core;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod word_by_word;
