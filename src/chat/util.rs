//! Shared provider plumbing: byte-safe truncation and error-body capping

use crate::redact::redact_transcript;

/// Maximum bytes of a provider error body that may surface in an error
pub const MAX_ERROR_BODY_BYTES: usize = 32_000;

/// Longest prefix of `s` that fits in `max_bytes` without splitting a code
/// point.
pub fn utf8_safe_prefix(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    // Back off up to 4 bytes to the nearest char boundary.
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Decode the longest valid UTF-8 prefix of `bytes` fitting in `max_bytes`.
///
/// Backs off up to 4 bytes so a multi-byte code point is never split; any
/// remaining invalid bytes are dropped rather than replaced.
pub fn utf8_safe_prefix_bytes(bytes: &[u8], max_bytes: usize) -> String {
    let mut end = bytes.len().min(max_bytes);
    let floor = end.saturating_sub(4);
    loop {
        match std::str::from_utf8(&bytes[..end]) {
            Ok(s) => return s.to_string(),
            Err(e) if e.valid_up_to() >= floor => {
                return std::str::from_utf8(&bytes[..e.valid_up_to()])
                    .unwrap_or_default()
                    .to_string();
            }
            Err(e) => {
                // Invalid bytes well inside the prefix: keep the valid part.
                end = e.valid_up_to();
                if end == 0 {
                    return String::new();
                }
            }
        }
    }
}

/// Cap and redact a provider error body before it surfaces anywhere.
pub fn cap_error_body(body: &str) -> String {
    redact_transcript(utf8_safe_prefix(body, MAX_ERROR_BODY_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_prefix() {
        assert_eq!(utf8_safe_prefix("hello", 3), "hel");
        assert_eq!(utf8_safe_prefix("hello", 10), "hello");
    }

    #[test]
    fn test_multibyte_never_split() {
        // Each '€' is 3 bytes.
        let s = "€€€";
        assert_eq!(utf8_safe_prefix(s, 4), "€");
        assert_eq!(utf8_safe_prefix(s, 5), "€");
        assert_eq!(utf8_safe_prefix(s, 6), "€€");
    }

    #[test]
    fn test_prefix_bytes_backs_off() {
        let bytes = "a€b".as_bytes();
        // Cutting mid-'€' backs off to just "a".
        assert_eq!(utf8_safe_prefix_bytes(bytes, 2), "a");
        assert_eq!(utf8_safe_prefix_bytes(bytes, 4), "a€");
    }

    #[test]
    fn test_cap_error_body_redacts() {
        let capped = cap_error_body(r#"{"error": "bad", "api_key": "sk-secretsecret1234"}"#);
        assert!(!capped.contains("secretsecret"));
    }

    #[test]
    fn test_cap_error_body_caps() {
        let long = "x".repeat(MAX_ERROR_BODY_BYTES + 100);
        assert_eq!(cap_error_body(&long).len(), MAX_ERROR_BODY_BYTES);
    }
}
