//! Public/private key classification.
//!
//! Keys starting with [`PRIVATE_PREFIX`] belong to the admin surface: the
//! public API can neither read nor write them.

use std::collections::BTreeMap;

pub const PRIVATE_PREFIX: char = '_';

pub fn is_private(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}

/// Drop every private key from a snapshot.
pub fn filter_public(data: BTreeMap<String, String>) -> BTreeMap<String, String> {
    data.into_iter().filter(|(key, _)| !is_private(key)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_private() {
        assert!(is_private("_secret"));
        assert!(is_private("_"));
        assert!(!is_private("public"));
        assert!(!is_private("a_b"));
        assert!(!is_private(""));
        assert!(!is_private(" _padded"));
    }

    #[test]
    fn test_filter_public() {
        let data = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("_secret".to_string(), "2".to_string()),
            ("b_c".to_string(), "3".to_string()),
        ]);

        let filtered = filter_public(data);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.contains_key("a"));
        assert!(filtered.contains_key("b_c"));
        assert!(!filtered.contains_key("_secret"));
    }
}
