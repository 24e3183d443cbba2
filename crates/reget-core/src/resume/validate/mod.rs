//! Checks that a resumed (range) response continues the interrupted one.

mod error;

use http::{HeaderMap, StatusCode};

use crate::range::ContentRange;

pub use error::{ValidationError, ValidationErrorKind};

/// What the first response told us, and how far delivery got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Bytes delivered so far, as an absolute offset into the entity.
    pub pos: u64,
    /// Exclusive end of the window the caller expects, if known.
    pub end: Option<u64>,
    /// Complete entity length, if known.
    pub size: Option<u64>,
    /// Strong validator captured from the first response.
    pub etag: String,
}

/// Strong `ETag` value, verbatim. Weak validators (`W/"..."`) are not usable
/// for byte-range continuation and yield None.
pub fn strong_etag(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(http::header::ETAG)?.to_str().ok()?.trim();
    if raw.is_empty() || raw.starts_with("W/") || raw.starts_with("w/") {
        return None;
    }
    Some(raw.to_string())
}

/// Returns the resumed `Content-Range` if the response may be spliced onto
/// the interrupted stream.
///
/// Requires 206, a parseable `Content-Range` starting exactly at `pos`, the
/// same end and complete length when those were known, and an identical
/// strong ETag.
pub fn validate_resumed(
    checkpoint: &Checkpoint,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<ContentRange, ValidationError> {
    let fail = |kind| Err(ValidationError { kind });

    if status != StatusCode::PARTIAL_CONTENT {
        return fail(ValidationErrorKind::NotPartial(status));
    }

    let range = match headers
        .get(http::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ContentRange::parse)
    {
        Some(r) => r,
        None => return fail(ValidationErrorKind::BadContentRange),
    };

    if range.start != checkpoint.pos {
        return fail(ValidationErrorKind::StartMismatch {
            expected: checkpoint.pos,
            got: range.start,
        });
    }

    if let Some(end) = checkpoint.end {
        if range.end != end {
            return fail(ValidationErrorKind::EndMismatch {
                expected: end,
                got: range.end,
            });
        }
    }

    if let Some(size) = checkpoint.size {
        if range.size != Some(size) {
            return fail(ValidationErrorKind::SizeMismatch {
                expected: size,
                got: range.size,
            });
        }
    }

    let etag = strong_etag(headers);
    if etag.as_deref() != Some(checkpoint.etag.as_str()) {
        return fail(ValidationErrorKind::EtagChanged {
            expected: checkpoint.etag.clone(),
            got: etag,
        });
    }

    Ok(range)
}
