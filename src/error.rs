//! 場景切割流程的錯誤分類

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 錯誤種類，用於摘要與報告
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    UnsupportedInput,
    DetectionFailed,
    InsufficientSpace,
    SplitSegmentFailed,
    JobFailed,
    Timeout,
    Cancelled,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "ValidationError",
            Self::UnsupportedInput => "UnsupportedInput",
            Self::DetectionFailed => "DetectionFailed",
            Self::InsufficientSpace => "InsufficientSpace",
            Self::SplitSegmentFailed => "SplitSegmentFailed",
            Self::JobFailed => "JobFailed",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Io => "Io",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("invalid setting `{key}`: {reason}")]
    Validation { key: String, reason: String },

    #[error("unsupported input {path}: {reason}")]
    UnsupportedInput { path: String, reason: String },

    #[error("scene detection failed: {0}")]
    DetectionFailed(String),

    #[error(
        "insufficient space: required {required} bytes, available {available} bytes (short by {shortfall} bytes)"
    )]
    InsufficientSpace {
        required: u64,
        available: u64,
        shortfall: u64,
    },

    #[error("segment {index} failed: {reason}")]
    SplitSegmentFailed { index: usize, reason: String },

    #[error("job produced no usable segment ({failed} of {planned} failed)")]
    JobFailed { planned: usize, failed: usize },

    #[error("job exceeded timeout of {seconds}s")]
    Timeout { seconds: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(String),
}

impl SplitError {
    pub fn validation(key: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::UnsupportedInput { .. } => ErrorKind::UnsupportedInput,
            Self::DetectionFailed(_) => ErrorKind::DetectionFailed,
            Self::InsufficientSpace { .. } => ErrorKind::InsufficientSpace,
            Self::SplitSegmentFailed { .. } => ErrorKind::SplitSegmentFailed,
            Self::JobFailed { .. } => ErrorKind::JobFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<std::io::Error> for SplitError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SplitError>;
