//! Translating between loopback proxy URLs and the origin URL they target
//! the target URL is carried as a single percent-encoded path
//! segment.

use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

use crate::errors::RangeProxyError;

/// Builds the loopback URL that, when requested, proxies `url` through this
/// server: `base + percent_encode(url)`.
pub fn encode_url(base: &str, url: &str) -> String {
    format!("{base}{}", utf8_percent_encode(url, NON_ALPHANUMERIC))
}

/// Recovers the target URL from a request path: strips the leading `/` and
/// percent-decodes the remainder.
pub fn decode_url(raw_path: &str) -> Result<String, RangeProxyError> {
    let trimmed = raw_path.strip_prefix('/').unwrap_or(raw_path);
    percent_decode_str(trimmed)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| RangeProxyError::InvalidUrl(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_decode() {
        let base = "http://127.0.0.1:9000/";
        let url = "https://example.com/a b.png?x=1&y=2";
        let encoded = encode_url(base, url);
        assert!(encoded.starts_with(base));

        let path = &encoded[base.len() - 1..]; // keep the leading '/'
        assert_eq!(decode_url(path).unwrap(), url);
    }

    #[test]
    fn strips_leading_slash_only() {
        assert_eq!(
            decode_url("/https://example.com/a").unwrap(),
            "https://example.com/a"
        );
    }
}
