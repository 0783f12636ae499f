pub mod error;

pub use error::{ErrorCategory, ErrorClassifier, ForgeError, LlmError, Result};

// =============================================================================
// Domain Newtypes
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type-safe wrapper for cache keys
///
/// A cache key names one unit of generated content and doubles as the step
/// identifier in progress events and the file stem on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Keys become file names, so only a conservative character set survives
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !self.0.starts_with('.')
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_file_safety() {
        assert!(CacheKey::new("ch2_b_data").is_file_safe());
        assert!(CacheKey::new("executive_summary").is_file_safe());
        assert!(!CacheKey::new("../escape").is_file_safe());
        assert!(!CacheKey::new("with space").is_file_safe());
        assert!(!CacheKey::new("").is_file_safe());
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::from("conclusions");
        assert_eq!(key.to_string(), "conclusions");
        assert_eq!(key.as_str(), "conclusions");
    }
}
