use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::pipeline::Stage;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Structured rejection returned instead of an analysis when input is unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Wrap a decode failure of the raw request body.
    pub fn decode(err: impl fmt::Display) -> Self {
        let mut report = Self::default();
        report.push("request", format!("malformed request: {}", err));
        report
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request rejected with {} error(s)", self.errors.len())?;
        for err in &self.errors {
            write!(f, "; {}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Rejected(#[from] ValidationReport),

    /// A stage broke an invariant of the pipeline. Always a defect.
    #[error("invariant violated during {stage}: {detail}")]
    InvariantViolation { stage: Stage, detail: String },
}

impl PipelineError {
    pub fn invariant(stage: Stage, detail: impl Into<String>) -> Self {
        PipelineError::InvariantViolation {
            stage,
            detail: detail.into(),
        }
    }

    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            PipelineError::Rejected(report) => Some(report),
            PipelineError::InvariantViolation { .. } => None,
        }
    }
}
