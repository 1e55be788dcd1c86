//! Job progress and the progress line protocol
//!
//! [`Progress`] is the aggregate owned by the job orchestrator. [`ProgressLine`]
//! is its wire form on the transfer subprocess's standard output: one
//! `total,success,failure` line per concluded file.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::outcome::SyncOutcome;

/// Aggregate file counters of one job attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Regular files found by the pre-count
    pub total: u64,
    /// Files whose transfer attempt concluded, successfully or not
    pub processed: u64,
    /// Subset of `processed` that failed
    pub failed: u64,
}

impl Progress {
    /// Progress of an attempt that has just finished counting
    #[must_use]
    pub fn with_total(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Account for one concluded file
    pub fn record(&mut self, outcome: &SyncOutcome) {
        self.processed += 1;
        if outcome.error.is_some() {
            self.failed += 1;
        }
    }

    /// Integer completion percentage, 0 when nothing is expected
    #[must_use]
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.processed.saturating_mul(100) / self.total
        }
    }

    /// Files that concluded without error
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.processed.saturating_sub(self.failed)
    }
}

// ============================================================================
// ProgressLine
// ============================================================================

/// One `total,success,failure` line of the subprocess protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressLine {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

impl ProgressLine {
    /// Files concluded so far
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.success + self.failure
    }
}

impl From<&Progress> for ProgressLine {
    fn from(progress: &Progress) -> Self {
        Self {
            total: progress.total,
            success: progress.succeeded(),
            failure: progress.failed,
        }
    }
}

impl From<ProgressLine> for Progress {
    fn from(line: ProgressLine) -> Self {
        Self {
            total: line.total,
            processed: line.processed(),
            failed: line.failure,
        }
    }
}

impl Display for ProgressLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.total, self.success, self.failure)
    }
}

impl FromStr for ProgressLine {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(',').map(str::trim).collect();
        let [total, success, failure] = fields.as_slice() else {
            return Err(DomainError::InvalidProgressLine(s.to_string()));
        };
        let parse = |v: &str| {
            v.parse::<u64>()
                .map_err(|_| DomainError::InvalidProgressLine(s.to_string()))
        };
        Ok(Self {
            total: parse(total)?,
            success: parse(success)?,
            failure: parse(failure)?,
        })
    }
}
