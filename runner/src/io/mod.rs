//! I/O for runner commands: configuration files, the HTTP generator,
//! prompt rendering and transcripts.

pub mod config;
pub mod generator;
pub mod openai;
pub mod prompt;
pub mod transcript;
