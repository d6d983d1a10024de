//! JSON pointer segment escaping (RFC 6901)

/// Escape one path segment for use in a JSON pointer: `~` becomes `~0`,
/// `/` becomes `~1`.
pub fn escape_pointer_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Invert [`escape_pointer_segment`]
pub fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_order_matters() {
        // '~' must be escaped before '/' so "~1" in input survives.
        assert_eq!(escape_pointer_segment("a/b"), "a~1b");
        assert_eq!(escape_pointer_segment("a~b"), "a~0b");
        assert_eq!(escape_pointer_segment("~/"), "~0~1");
    }

    #[test]
    fn test_round_trip() {
        for segment in ["plain", "a/b", "a~b", "~1", "~0", "a~1b/c~0d", ""] {
            assert_eq!(unescape_pointer_segment(&escape_pointer_segment(segment)), segment);
        }
    }
}
