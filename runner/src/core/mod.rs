//! Deterministic, pure logic shared by the runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and return deterministic outputs suitable for tests.

pub mod catalog;
pub mod constraint;
pub mod policy;
pub mod prefix;
pub mod rollback;
pub mod text;
pub mod types;
