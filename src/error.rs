//! Error types for the detection engine
//!
//! Leaf components never terminate the process. They return an
//! [`EngineError`] and the duty loops decide, through
//! [`EngineError::disposition`], whether a failure ends the duty, skips the
//! current cycle or is treated as "no anomalies".

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ModelFamily;
use crate::tasks::DutyKind;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur anywhere between acquisition and reporting
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or inconsistent settings
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Method identifier is not registered for the requested family
    #[error("unknown {family} method '{method}'")]
    UnknownMethod { method: String, family: ModelFamily },

    /// The underlying fit call failed
    #[error("failed to fit {method}: {reason}")]
    Fit { method: String, reason: String },

    /// The underlying predict call failed
    #[error("prediction with {method} failed: {reason}")]
    Predict { method: String, reason: String },

    /// No persisted artifact for `(method, name)`
    #[error("no model artifact for {method}/{name} in {}", dir.display())]
    ModelNotFound {
        method: String,
        name: String,
        dir: PathBuf,
    },

    /// An artifact exists but cannot be restored
    #[error("corrupt model artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    /// A frame ended up with zero rows
    #[error("empty result after {0}")]
    EmptyResult(String),

    /// A user supplied query has a shape the formatter cannot flatten
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// The monitoring backend answered with an error or a malformed body
    #[error("monitoring backend error: {0}")]
    Backend(String),

    /// Anomaly delivery failed on the primary target
    #[error("failed to report anomalies: {0}")]
    Report(String),

    /// Column length or type mismatch inside a frame
    #[error("frame error: {0}")]
    Frame(String),

    /// A duty was stopped because a sibling failed
    #[error("duty halted")]
    Halted,

    /// A duty panicked or its executor failed
    #[error("duty execution failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure classes the orchestration layer reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    TransientAcquisition,
    PipelineEmptiness,
    ModelFailure,
    MissingArtifact,
    Delivery,
    Internal,
}

/// What a duty does with a failed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// End the duty and halt the supervisor
    Fatal,
    /// Log and continue with the next cycle
    SkipCycle,
    /// Log and treat the cycle as having produced no anomalies
    NoAnomalies,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Config(_)
            | EngineError::UnknownMethod { .. }
            | EngineError::UnsupportedQuery(_) => ErrorKind::Configuration,
            EngineError::Backend(_) | EngineError::Http(_) => ErrorKind::TransientAcquisition,
            EngineError::EmptyResult(_) => ErrorKind::PipelineEmptiness,
            EngineError::Fit { .. } | EngineError::Predict { .. } => ErrorKind::ModelFailure,
            EngineError::ModelNotFound { .. } | EngineError::CorruptArtifact { .. } => {
                ErrorKind::MissingArtifact
            }
            EngineError::Report(_) => ErrorKind::Delivery,
            EngineError::Frame(_)
            | EngineError::Halted
            | EngineError::Task(_)
            | EngineError::Io(_)
            | EngineError::Csv(_)
            | EngineError::Json(_) => ErrorKind::Internal,
        }
    }

    /// Decide how `duty` reacts to this error.
    ///
    /// Train runs once, so everything is fatal there. The looping duties
    /// survive acquisition gaps, empty cycles and delivery failures; Detect
    /// additionally turns model failures into an empty cycle.
    pub fn disposition(&self, duty: DutyKind) -> Disposition {
        match (self.kind(), duty) {
            (_, DutyKind::Train) => Disposition::Fatal,
            (ErrorKind::Configuration | ErrorKind::MissingArtifact | ErrorKind::Internal, _) => {
                Disposition::Fatal
            }
            (ErrorKind::ModelFailure, DutyKind::Detect) => Disposition::NoAnomalies,
            (ErrorKind::ModelFailure, DutyKind::Point) => Disposition::Fatal,
            (
                ErrorKind::TransientAcquisition | ErrorKind::PipelineEmptiness | ErrorKind::Delivery,
                _,
            ) => Disposition::SkipCycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_treats_everything_as_fatal() {
        let errors = [
            EngineError::Backend("timeout".into()),
            EngineError::EmptyResult("filtering".into()),
            EngineError::Fit {
                method: "isoforest".into(),
                reason: "singular".into(),
            },
        ];
        for err in errors {
            assert_eq!(err.disposition(DutyKind::Train), Disposition::Fatal);
        }
    }

    #[test]
    fn test_model_failure_asymmetry() {
        let err = EngineError::Predict {
            method: "sdbscan".into(),
            reason: "dimension mismatch".into(),
        };
        assert_eq!(err.disposition(DutyKind::Detect), Disposition::NoAnomalies);
        assert_eq!(err.disposition(DutyKind::Train), Disposition::Fatal);
    }

    #[test]
    fn test_missing_artifact_is_fatal_for_detect() {
        let err = EngineError::ModelNotFound {
            method: "isoforest".into(),
            name: "modelA".into(),
            dir: PathBuf::from("models"),
        };
        assert_eq!(err.kind(), ErrorKind::MissingArtifact);
        assert_eq!(err.disposition(DutyKind::Detect), Disposition::Fatal);
    }

    #[test]
    fn test_looping_duties_skip_transient_cycles() {
        let err = EngineError::EmptyResult("system acquisition".into());
        assert_eq!(err.disposition(DutyKind::Point), Disposition::SkipCycle);
        assert_eq!(err.disposition(DutyKind::Detect), Disposition::SkipCycle);

        let err = EngineError::Config("missing regex".into());
        assert_eq!(err.disposition(DutyKind::Point), Disposition::Fatal);
    }
}
