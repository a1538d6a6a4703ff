// SPDX-License-Identifier: GPL-3.0-only

//! Per-process session identifier

use crate::constants::app_info::{SESSION_PREFIX, SESSION_SUFFIX_LEN};
use serde::Serialize;
use std::fmt;

/// Opaque token tagging every submission from one process run
///
/// Generated once at startup and never mutated. Short enough to read in logs;
/// uniqueness across processes is probabilistic only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier, e.g. `user_3f9a0c2b1`
    pub fn generate() -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}{}",
            SESSION_PREFIX,
            &random[..SESSION_SUFFIX_LEN]
        ))
    }

    /// Wrap an existing identifier
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_format() {
        let id = SessionId::generate();
        let suffix = id.as_str().strip_prefix("user_").expect("prefix");
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = SessionId::from_string("user_abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user_abc\"");
    }
}
