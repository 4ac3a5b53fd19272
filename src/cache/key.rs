//! Cache key derivation.
//!
//! Keys are derived in two steps: [`normalize`] folds case and incidental
//! whitespace, then [`fingerprint`] hashes the normalized text with SHA-256.
//! Matching is purely lexical; paraphrases produce different keys.
//!
//! SHA-256 is stable across processes and platforms, so keys stay valid for a
//! shared store, unlike `DefaultHasher`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separates the scope from the text inside the hashed material.
const SCOPE_SEPARATOR: u8 = 0x1f;

/// Deterministic fingerprint of a normalized request.
///
/// Hex-encoded SHA-256 digest (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Normalize `text` and fingerprint it, optionally scoped to a target or
    /// model so the same prompt sent to different targets is cached apart.
    pub fn derive(text: &str, scope: Option<&str>) -> Self {
        let normalized = normalize(text);
        match scope {
            Some(scope) => fingerprint_scoped(scope, &normalized),
            None => fingerprint(&normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lowercase, collapse whitespace runs to a single space, trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hash already-normalized text into a [`CacheKey`].
pub fn fingerprint(normalized: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}

/// Hash already-normalized text together with a scope.
///
/// The scope is length-prefixed so `("ab", "c")` and `("a", "bc")` never
/// share a digest.
pub fn fingerprint_scoped(scope: &str, normalized: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update((scope.len() as u64).to_le_bytes());
    hasher.update(scope.as_bytes());
    hasher.update([SCOPE_SEPARATOR]);
    hasher.update(normalized.as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}

/// Join scope components into one scope string.
///
/// Each part is written as `<len>:<part>`, so no two distinct part lists
/// render to the same scope.
pub fn compose_scope(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| format!("{}:{part}", part.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  Hello \t  WORLD\n"), "hello world");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t "), "");
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let key = fingerprint("");
        assert_eq!(
            key.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn composed_scope_keeps_parts_apart() {
        assert_eq!(compose_scope(&["claude", ""]), "6:claude0:");
        assert_ne!(compose_scope(&["a", "b c"]), compose_scope(&["a b", "c"]));
        assert_ne!(compose_scope(&["ab"]), compose_scope(&["a", "b"]));
    }

    #[test]
    fn scope_is_unambiguous() {
        assert_ne!(fingerprint_scoped("ab", "c"), fingerprint_scoped("a", "bc"));
        assert_ne!(fingerprint_scoped("", "abc"), fingerprint("abc"));
    }
}
