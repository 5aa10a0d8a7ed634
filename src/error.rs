//! Error taxonomy shared by every pipeline stage.
//!
//! Stage threads never surface errors directly.  Each failure is trapped,
//! recorded in the run's failure registry under an [`Origin`] fingerprint,
//! and re-raised by the orchestrator as [`Error::Aggregate`] only after all
//! threads have joined.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, Error>;

// ── Error ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum Error {
    /// Bad block or configuration.  Raised before any thread is spawned.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Malformed length prefix or truncated frame in a compressed stream.
    #[error("Corrupt framing: {0}")]
    CorruptFraming(String),
    /// Malformed sequence tag or inconsistent block sequence.
    #[error("Corrupt data: {0}")]
    CorruptData(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Stage panicked: {0}")]
    StagePanicked(String),
    #[error("Pipeline already started; each instance runs a single conversion")]
    AlreadyStarted,
    #[error(transparent)]
    Aggregate(AggregateFailure),
}

impl Error {
    /// Stable label for the error's variant.  Forms half of the [`Origin`]
    /// fingerprint, so it must never include per-instance detail.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid-argument",
            Error::CorruptFraming(_)  => "corrupt-framing",
            Error::CorruptData(_)     => "corrupt-data",
            Error::Io(_)              => "io",
            Error::Codec(e)           => e.kind(),
            Error::StagePanicked(_)   => "panic",
            Error::AlreadyStarted     => "already-started",
            Error::Aggregate(_)       => "aggregate",
        }
    }

    /// Failures captured by the run, if this is an aggregate.
    pub fn failures(&self) -> &[StageFailure] {
        match self {
            Error::Aggregate(agg) => &agg.failures,
            _                     => &[],
        }
    }
}

// ── Stage identity ───────────────────────────────────────────────────────────

/// The three thread roles of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Reader,
    Worker,
    Writer,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Reader => "reader",
            StageKind::Worker => "worker",
            StageKind::Writer => "writer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deduplication key for captured failures: where the failure surfaced and
/// what kind of failure it was.  Identical failures raised by several worker
/// threads share one origin and are reported once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Origin {
    pub stage: StageKind,
    pub kind:  &'static str,
}

impl Origin {
    pub fn of(stage: StageKind, error: &Error) -> Self {
        Self { stage, kind: error.kind() }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stage, self.kind)
    }
}

// ── Aggregate ────────────────────────────────────────────────────────────────

/// One distinct failure captured during a run.
#[derive(Debug)]
pub struct StageFailure {
    pub origin: Origin,
    pub error:  Error,
}

/// Every distinct failure of a run, in first-seen order.
#[derive(Debug, Default)]
pub struct AggregateFailure {
    pub failures: Vec<StageFailure>,
}

impl AggregateFailure {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageFailure> {
        self.failures.iter()
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline failed with {} error(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  [{}] {}", failure.origin.stage, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures.first().map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}
