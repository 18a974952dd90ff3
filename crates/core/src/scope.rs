//! Scope identity: the per-show-per-schedule namespace all queue state
//! belongs to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced when parsing a scope identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeIdError {
    #[error("scope id must have the form <show_id>:<sched_id>, got {0:?}")]
    MalformedScope(String),

    #[error("scope id components must be non-empty")]
    EmptyComponent,
}

/// Identifier for one performance instance (`show_id:sched_id`).
///
/// Immutable once constructed; used as the namespace prefix for every
/// queue structure belonging to that performance. Two scopes never
/// share tickets, ordering, or counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeId {
    show_id: String,
    sched_id: String,
}

impl ScopeId {
    /// Build a scope id from its two components.
    ///
    /// Components must be non-empty and must not contain the `:`
    /// separator, so the string form round-trips unambiguously.
    pub fn new(show_id: impl Into<String>, sched_id: impl Into<String>) -> Result<Self, ScopeIdError> {
        let show_id = show_id.into();
        let sched_id = sched_id.into();
        if show_id.is_empty() || sched_id.is_empty() {
            return Err(ScopeIdError::EmptyComponent);
        }
        if show_id.contains(':') || sched_id.contains(':') {
            return Err(ScopeIdError::MalformedScope(format!(
                "{}:{}",
                show_id, sched_id
            )));
        }
        Ok(Self { show_id, sched_id })
    }

    pub fn show_id(&self) -> &str {
        &self.show_id
    }

    pub fn sched_id(&self) -> &str {
        &self.sched_id
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.show_id, self.sched_id)
    }
}

impl FromStr for ScopeId {
    type Err = ScopeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((show, sched)) => Self::new(show, sched),
            None => Err(ScopeIdError::MalformedScope(s.to_string())),
        }
    }
}

impl TryFrom<String> for ScopeId {
    type Error = ScopeIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ScopeId> for String {
    fn from(scope: ScopeId) -> Self {
        scope.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_display() {
        let scope = ScopeId::new("show-42", "sched-7").unwrap();
        assert_eq!(scope.show_id(), "show-42");
        assert_eq!(scope.sched_id(), "sched-7");
        assert_eq!(scope.to_string(), "show-42:sched-7");
    }

    #[test]
    fn test_parse_round_trip() {
        let scope: ScopeId = "show-42:sched-7".parse().unwrap();
        assert_eq!(scope, ScopeId::new("show-42", "sched-7").unwrap());
    }

    #[test]
    fn test_parse_missing_separator() {
        let result: Result<ScopeId, _> = "show-42".parse();
        assert!(matches!(result, Err(ScopeIdError::MalformedScope(_))));
    }

    #[test]
    fn test_empty_component_rejected() {
        assert_eq!(ScopeId::new("", "sched"), Err(ScopeIdError::EmptyComponent));
        assert_eq!(ScopeId::new("show", ""), Err(ScopeIdError::EmptyComponent));
    }

    #[test]
    fn test_component_with_separator_rejected() {
        let result = ScopeId::new("show:extra", "sched");
        assert!(matches!(result, Err(ScopeIdError::MalformedScope(_))));
    }

    #[test]
    fn test_serde_as_string() {
        let scope = ScopeId::new("s1", "p1").unwrap();
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, r#""s1:p1""#);
        let back: ScopeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scope);
    }
}
