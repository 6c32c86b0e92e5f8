//! Per-ballot outcomes of a sweep.

use std::fmt;

use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BallotOutcome {
    /// A draft set was written.
    Completed { records: usize },
    /// Waiting on an OCR job.
    Waiting { reason: String },
    /// Nothing to do, or nothing that can be done yet.
    Skipped { reason: String },
    Failed { error: String },
}

impl BallotOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        BallotOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn waiting(reason: impl Into<String>) -> Self {
        BallotOutcome::Waiting {
            reason: reason.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BallotOutcome::Completed { .. } => "completed",
            BallotOutcome::Waiting { .. } => "waiting",
            BallotOutcome::Skipped { .. } => "skipped",
            BallotOutcome::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for BallotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BallotOutcome::Completed { records } => write!(f, "completed ({} records)", records),
            BallotOutcome::Waiting { reason } => write!(f, "waiting: {}", reason),
            BallotOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            BallotOutcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BallotReport {
    pub ballot_paper_id: String,
    #[serde(flatten)]
    pub outcome: BallotOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub ballots: Vec<BallotReport>,
}

impl SweepReport {
    pub fn record(&mut self, ballot_paper_id: impl Into<String>, outcome: BallotOutcome) {
        self.ballots.push(BallotReport {
            ballot_paper_id: ballot_paper_id.into(),
            outcome,
        });
    }

    fn count(&self, label: &str) -> usize {
        self.ballots
            .iter()
            .filter(|b| b.outcome.label() == label)
            .count()
    }

    pub fn completed(&self) -> usize {
        self.count("completed")
    }

    pub fn waiting(&self) -> usize {
        self.count("waiting")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn outcome(&self, ballot_paper_id: &str) -> Option<&BallotOutcome> {
        self.ballots
            .iter()
            .find(|b| b.ballot_paper_id == ballot_paper_id)
            .map(|b| &b.outcome)
    }

    pub fn log_summary(&self) {
        info!(
            ballots = self.ballots.len(),
            completed = self.completed(),
            waiting = self.waiting(),
            skipped = self.skipped(),
            failed = self.failed(),
            "Sweep finished"
        );
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ballot in &self.ballots {
            writeln!(f, "{}: {}", ballot.ballot_paper_id, ballot.outcome)?;
        }
        write!(
            f,
            "{} ballots: {} completed, {} waiting, {} skipped, {} failed",
            self.ballots.len(),
            self.completed(),
            self.waiting(),
            self.skipped(),
            self.failed()
        )
    }
}
