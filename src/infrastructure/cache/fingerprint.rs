//! Deterministic cache keys.
//!
//! Keys are SHA-256 digests of a canonical rendering of the logical input,
//! so repeated identical inputs always land on the same entry.

use sha2::{Digest, Sha256};

use crate::domain::models::Filter;

/// Collapse runs of whitespace and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Key for an embedding of `text`, namespaced by model identity.
pub fn text_fingerprint(namespace: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"embed\0");
    hasher.update(namespace.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalize_text(text).as_bytes());
    hex::encode(hasher.finalize())
}

/// Key for a search result set.
pub fn query_fingerprint(
    query: &str,
    filter: Option<&Filter>,
    limit: usize,
    min_score: Option<f32>,
) -> String {
    // serde_json renders enums and BTreeMaps in a fixed order
    let filter = filter
        .and_then(|f| serde_json::to_string(f).ok())
        .unwrap_or_default();
    let min_score = min_score.map(|s| s.to_bits().to_string()).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(b"query\0");
    hasher.update(normalize_text(query).as_bytes());
    hasher.update(b"\0");
    hasher.update(filter.as_bytes());
    hasher.update(b"\0");
    hasher.update(limit.to_le_bytes());
    hasher.update(b"\0");
    hasher.update(min_score.as_bytes());
    hex::encode(hasher.finalize())
}

/// File-safe digest of an arbitrary cache key.
pub fn key_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_whitespace_normalization() {
        assert_eq!(normalize_text("  async \t retry\n pattern "), "async retry pattern");
        assert_eq!(
            text_fingerprint("m", "async retry"),
            text_fingerprint("m", " async   retry ")
        );
    }

    #[test]
    fn test_query_fingerprint_covers_every_input() {
        let base = query_fingerprint("q", None, 5, None);
        assert_ne!(base, query_fingerprint("q", None, 6, None));
        assert_ne!(base, query_fingerprint("q", None, 5, Some(0.5)));
        assert_ne!(base, query_fingerprint("q", Some(&Filter::eq("lang", "go")), 5, None));
        assert_ne!(
            query_fingerprint("q", Some(&Filter::eq("lang", "go")), 5, None),
            query_fingerprint("q", Some(&Filter::eq("lang", "rust")), 5, None)
        );
    }

    #[test]
    fn test_key_digest_is_hex() {
        let digest = key_digest("anything / with : odd chars");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn proptest_text_fingerprint_deterministic(text in ".{0,200}", ns in "[a-z0-9-]{1,20}") {
            prop_assert_eq!(text_fingerprint(&ns, &text), text_fingerprint(&ns, &text));
        }

        #[test]
        fn proptest_namespaces_do_not_collide(text in "[a-z ]{1,50}") {
            prop_assert_ne!(text_fingerprint("minilm-384", &text), text_fingerprint("mpnet-768", &text));
        }

        #[test]
        fn proptest_query_fingerprint_deterministic(query in ".{0,100}", limit in 1usize..100) {
            let filter = Filter::eq("lang", "python");
            prop_assert_eq!(
                query_fingerprint(&query, Some(&filter), limit, Some(0.25)),
                query_fingerprint(&query, Some(&filter), limit, Some(0.25))
            );
        }
    }
}
