//! Error types for resumed-response validation.

use std::fmt;

use http::StatusCode;

/// A resumed response could not prove it continues the interrupted one.
///
/// Only logged: the controller surfaces the failure that triggered the
/// resume instead.
#[derive(Debug)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Server did not answer the range request with 206.
    NotPartial(StatusCode),
    /// `Content-Range` missing or unparseable.
    BadContentRange,
    /// Resumed range does not start where delivery stopped.
    StartMismatch { expected: u64, got: u64 },
    /// Resumed range ends somewhere else than the original window.
    EndMismatch { expected: u64, got: u64 },
    /// Complete length changed between responses.
    SizeMismatch { expected: u64, got: Option<u64> },
    /// Entity tag changed (or vanished, or became weak).
    EtagChanged { expected: String, got: Option<String> },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resumed response rejected: ")?;
        match &self.kind {
            ValidationErrorKind::NotPartial(status) => {
                write!(f, "expected 206, got {}", status.as_u16())
            }
            ValidationErrorKind::BadContentRange => write!(f, "missing or invalid Content-Range"),
            ValidationErrorKind::StartMismatch { expected, got } => {
                write!(f, "range starts at {} instead of {}", got, expected)
            }
            ValidationErrorKind::EndMismatch { expected, got } => {
                write!(f, "range ends at {} instead of {}", got, expected)
            }
            ValidationErrorKind::SizeMismatch { expected, got } => match got {
                Some(got) => write!(f, "size {} instead of {}", got, expected),
                None => write!(f, "size unknown instead of {}", expected),
            },
            ValidationErrorKind::EtagChanged { expected, got } => match got {
                Some(got) => write!(f, "ETag {} instead of {}", got, expected),
                None => write!(f, "no strong ETag (expected {})", expected),
            },
        }
    }
}

impl std::error::Error for ValidationError {}
