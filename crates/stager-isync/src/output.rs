//! Progress line writer
//!
//! Stdout carries nothing but `total,success,failure` lines; the parent
//! parses every line it reads. Each line is flushed as soon as it is
//! written so the parent's no-progress timer sees it immediately.

use std::io::{self, Write};

use stager_core::domain::{Progress, ProgressLine, SyncOutcome};

/// Writes the running tally of one transfer
pub struct ProgressWriter<W: Write> {
    out: W,
    progress: Progress,
}

impl<W: Write> ProgressWriter<W> {
    pub fn new(out: W, total: u64) -> Self {
        Self {
            out,
            progress: Progress::with_total(total),
        }
    }

    /// Announce the total with a `total,0,0` line
    pub fn start(&mut self) -> io::Result<()> {
        self.emit()
    }

    /// Count one concluded file and write the new tally
    pub fn record(&mut self, outcome: &SyncOutcome) -> io::Result<()> {
        self.progress.record(outcome);
        self.emit()
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", ProgressLine::from(&self.progress))?;
        self.out.flush()
    }
}
