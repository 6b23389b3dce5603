//! JSONL transcript of a run.
//!
//! Product artifact written next to the CLI invocation, independent of
//! `RUST_LOG`. One line per event, then one summary line.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::events::{RunEvent, RunObserver, RunSnapshot, RunSummary};

#[derive(Serialize)]
struct EventLine<'a> {
    seq: u64,
    event: &'a RunEvent,
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    summary: &'a RunSummary,
}

pub struct Transcript {
    path: PathBuf,
    writer: BufWriter<File>,
    seq: u64,
    /// First write failure; later events are dropped.
    error: Option<anyhow::Error>,
}

impl Transcript {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("create transcript {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            seq: 0,
            error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, event: &RunEvent) -> Result<()> {
        self.seq += 1;
        self.write_line(&EventLine {
            seq: self.seq,
            event,
        })
    }

    /// Append the summary line and flush. Reports the first failed write.
    pub fn finish(mut self, snapshot: &RunSnapshot) -> Result<PathBuf> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let summary = snapshot.summary();
        self.write_line(&SummaryLine { summary: &summary })?;
        self.writer
            .flush()
            .with_context(|| format!("flush transcript {}", self.path.display()))?;
        Ok(self.path)
    }

    fn write_line<T: Serialize>(&mut self, line: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line).context("serialize transcript line")?;
        self.writer
            .write_all(b"\n")
            .with_context(|| format!("write transcript {}", self.path.display()))
    }
}

impl RunObserver for Transcript {
    fn on_event(&mut self, event: &RunEvent) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.record(event) {
            warn!(path = %self.path.display(), error = %err, "transcript write failed");
            self.error = Some(err);
        }
    }
}
