//! Stable content hashing for story ids.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::canonical::identity_key;

/// Lowercase hex SHA-256 of `value`. Deterministic across runs and processes.
pub fn sha256_hex(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Stable story id: hash of the URL identity key, or of `title|source` when the
/// URL yields no identity.
pub fn story_id(canonical_url: &str, title: &str, source: &str) -> String {
    let key = identity_key(canonical_url);
    if key.is_empty() {
        sha256_hex(&format!("{}|{}", title.trim(), source.trim()))
    } else {
        sha256_hex(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(
            sha256_hex("test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn distinct_inputs_distinct_digests() {
        let a = sha256_hex("https://example.com/a");
        let b = sha256_hex("https://example.com/b");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn story_id_follows_url_identity() {
        let a = story_id("https://Example.com/story/?utm_source=x", "A", "rss");
        let b = story_id("https://example.com/story", "B", "search_api");
        assert_eq!(a, b);
    }

    #[test]
    fn story_id_falls_back_to_title_and_source() {
        let a = story_id("", " Title ", "rss");
        assert_eq!(a, sha256_hex("Title|rss"));
        assert_ne!(a, story_id("", "Title", "search_api"));
    }
}
