//! Lenient `Range: bytes=...` header parsing. The `bytes=`
//! prefix is optional and either endpoint may be omitted.

/// An inclusive byte range as parsed from a `Range` header. `end` is `None`
/// when the request omitted the upper bound (`bytes=START-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

/// Parses a `Range` header value. Missing endpoints are left as `0`/`None`
/// for the caller to resolve against the resource's actual length.
pub fn parse_range(value: &str) -> Option<ByteRange> {
    let spec = value.strip_prefix("bytes=").unwrap_or(value).trim();
    let (start_str, end_str) = spec.split_once('-')?;

    let start = if start_str.trim().is_empty() {
        0
    } else {
        start_str.trim().parse().ok()?
    };

    let end = if end_str.trim().is_empty() {
        None
    } else {
        Some(end_str.trim().parse().ok()?)
    };

    Some(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounded_range_with_prefix() {
        assert_eq!(
            parse_range("bytes=0-99"),
            Some(ByteRange {
                start: 0,
                end: Some(99)
            })
        );
    }

    #[test]
    fn parses_open_ended_range() {
        assert_eq!(
            parse_range("bytes=100-"),
            Some(ByteRange {
                start: 100,
                end: None
            })
        );
    }

    #[test]
    fn accepts_missing_bytes_prefix() {
        assert_eq!(
            parse_range("10-20"),
            Some(ByteRange {
                start: 10,
                end: Some(20)
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_range("nonsense"), None);
    }
}
