use crate::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage a cached outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Parse,
    Scan,
    Analyze,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => write!(f, "load"),
            Stage::Parse => write!(f, "parse"),
            Stage::Scan => write!(f, "scan"),
            Stage::Analyze => write!(f, "analyze"),
        }
    }
}

/// Failure of a single pipeline stage for a single document.
///
/// Cloneable so that it can be stored as a settled cache outcome and handed
/// to every requester of that entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} failed for {url}: {message}")]
pub struct StageError {
    pub url: DocumentId,
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(url: DocumentId, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            url,
            stage,
            message: message.into(),
        }
    }

    /// Re-attribute a collaborator error to `url` and `stage`.
    pub fn from_error(url: &DocumentId, stage: Stage, err: &DocGraphError) -> Self {
        match err {
            DocGraphError::Stage(inner) => inner.clone(),
            other => Self::new(url.clone(), stage, other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum DocGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Cannot load document: {0}")]
    CannotLoad(DocumentId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, DocGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_display() {
        let err = StageError::new("a.html".into(), Stage::Parse, "unexpected token");
        assert_eq!(err.to_string(), "parse failed for a.html: unexpected token");
    }

    #[test]
    fn from_error_keeps_existing_stage_error() {
        let inner = StageError::new("b.html".into(), Stage::Load, "missing");
        let wrapped = DocGraphError::from(inner.clone());
        let attributed = StageError::from_error(&"a.html".into(), Stage::Parse, &wrapped);
        assert_eq!(attributed, inner);
    }

    #[test]
    fn from_error_wraps_other_errors() {
        let err = DocGraphError::CannotLoad("x.html".into());
        let attributed = StageError::from_error(&"x.html".into(), Stage::Load, &err);
        assert_eq!(attributed.stage, Stage::Load);
        assert!(attributed.message.contains("Cannot load document"));
    }
}
