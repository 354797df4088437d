//! Content fingerprinting for change detection.
//!
//! A page's identity over time is the SHA-256 digest of its normalized
//! extracted text. Change detection is digest inequality; a missing prior
//! digest means "new page", which callers must treat as no change.

use sha2::{Digest, Sha256};

/// Compute the hex-encoded SHA-256 digest of extracted text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Return true if the digests differ.
pub fn has_changed(old_digest: &str, new_digest: &str) -> bool {
    old_digest != new_digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("Hello world");
        let b = fingerprint("Hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_distinct_texts_produce_distinct_digests() {
        assert_ne!(fingerprint("Hello"), fingerprint("Hello world"));
        assert_ne!(fingerprint(""), fingerprint(" "));
    }

    #[test]
    fn test_has_changed() {
        let old = fingerprint("before");
        let new = fingerprint("after");
        assert!(has_changed(&old, &new));
        assert!(!has_changed(&old, &old));
    }
}
