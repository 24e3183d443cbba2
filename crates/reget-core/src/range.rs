//! `Range` / `Content-Range` arithmetic. All ends are exclusive internally;
//! header values use HTTP's inclusive last-byte position.

/// Parsed `Content-Range: bytes <first>-<last>/<size|*>` as `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
    /// Complete length, None for `*`.
    pub size: Option<u64>,
}

impl ContentRange {
    /// Parse a `Content-Range` value. Unsatisfied ranges (`bytes */N`),
    /// malformed values and a last position with no exclusive end yield None.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = strip_prefix_ignore_case(value.trim(), "bytes")?;
        let rest = rest.trim_start();
        let (span, size) = rest.split_once('/')?;
        let (first, last) = span.trim().split_once('-')?;
        let start: u64 = first.trim().parse().ok()?;
        let last: u64 = last.trim().parse().ok()?;
        if last < start {
            return None;
        }
        let size = match size.trim() {
            "*" => None,
            s => Some(s.parse::<u64>().ok()?),
        };
        if let Some(size) = size {
            if last >= size {
                return None;
            }
        }
        Some(Self {
            start,
            end: last.checked_add(1)?,
            size,
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }
}

/// Request byte range `[start, end)`; `end` None means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Parse a single-range `Range: bytes=<first>-[<last>]` value. Suffix
    /// ranges (`bytes=-N`), multi-ranges and a last position of `u64::MAX`
    /// are not supported and yield None.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = strip_prefix_ignore_case(value.trim(), "bytes=")?;
        if rest.contains(',') {
            return None;
        }
        let (first, last) = rest.trim().split_once('-')?;
        let start: u64 = first.trim().parse().ok()?;
        let last = last.trim();
        let end = if last.is_empty() {
            None
        } else {
            let last: u64 = last.parse().ok()?;
            if last < start {
                return None;
            }
            Some(last.checked_add(1)?)
        };
        Some(Self { start, end })
    }

    /// HTTP Range header value (inclusive end): `bytes=start-(end-1)` or `bytes=start-`.
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) if end > self.start => format!("bytes={}-{}", self.start, end - 1),
            _ => format!("bytes={}-", self.start),
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
