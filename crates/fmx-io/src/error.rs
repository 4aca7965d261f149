//! Error types for fmx-io

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use fmx_model::{FrameKey, MatrixShapeError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FieldError>;

/// Run-terminating failures.
#[derive(Error, Debug)]
pub enum FieldError {
    #[error("cannot open result archive {path}: {message}")]
    ArchiveOpen { path: PathBuf, message: String },

    #[error("result archive '{0}' has no instances")]
    NoInstances(String),

    #[error("no .{ext} report files found in {dir}")]
    NoReportFiles { dir: PathBuf, ext: String },

    #[error("no usable frames survived extraction")]
    NoFrames,

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("malformed field matrix at line {line}: {message}")]
    MalformedMatrix { line: usize, message: String },

    #[error("field matrix has {found} node columns, expected {expected}")]
    NodeCount { expected: usize, found: usize },

    #[error("matrix shape error: {0}")]
    Shape(#[from] MatrixShapeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a single frame (or report file) was left out of the assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    FieldMissing { variable: String },
    NoPositionData,
    Unreadable { message: String },
    NoValues { dropped: usize },
    NoDataBlock,
    NoValidRows,
    NodeCountMismatch { expected: usize, found: usize },
    NodeSetMismatch { missing: usize, unexpected: usize },
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::FieldMissing { variable } => {
                write!(f, "field output '{variable}' not present")
            }
            SkipReason::NoPositionData => {
                write!(f, "no nodal or element-nodal data")
            }
            SkipReason::Unreadable { message } => write!(f, "unreadable: {message}"),
            SkipReason::NoValues { dropped } => {
                write!(f, "no extractable values ({dropped} samples dropped)")
            }
            SkipReason::NoDataBlock => write!(f, "no data delimiter line"),
            SkipReason::NoValidRows => write!(f, "no valid numeric rows"),
            SkipReason::NodeCountMismatch { expected, found } => {
                write!(f, "has {found} nodes, expected {expected}")
            }
            SkipReason::NodeSetMismatch {
                missing,
                unexpected,
            } => write!(
                f,
                "node set differs from the first frame ({missing} missing, {unexpected} unexpected)"
            ),
        }
    }
}

/// A frame that did not make it into the matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFrame {
    /// Frame label, or the report file name.
    pub label: String,
    pub key: Option<FrameKey>,
    pub reason: SkipReason,
}

impl SkippedFrame {
    pub fn new(label: impl Into<String>, key: Option<FrameKey>, reason: SkipReason) -> Self {
        Self {
            label: label.into(),
            key,
            reason,
        }
    }

    /// Whether the frame had no data at all, as opposed to data that was
    /// rejected by the consistency check.
    pub fn is_data_gap(&self) -> bool {
        matches!(
            self.reason,
            SkipReason::FieldMissing { .. }
                | SkipReason::NoPositionData
                | SkipReason::Unreadable { .. }
                | SkipReason::NoValues { .. }
        )
    }
}
