//! Located response errors.

use crate::path::PathSegment;
use rxgql_core::SourceLocation;
use serde::{Deserialize, Serialize};

/// An error as it appears in a response snapshot: a message plus the source
/// locations and response path where it occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<SourceLocation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub path: Vec<PathSegment>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_locations(mut self, locations: Vec<SourceLocation>) -> Self {
        self.locations = locations;
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }
}

impl std::fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GraphQLError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_message_only_when_unlocated() {
        let error = GraphQLError::new("boom");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json, serde_json::json!({"message": "boom"}));
    }

    #[test]
    fn test_serializes_locations_and_path() {
        let error = GraphQLError::new("boom")
            .with_locations(vec![SourceLocation { line: 1, column: 3 }])
            .with_path(vec![PathSegment::from("launched"), PathSegment::from(0usize)]);
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": "boom",
                "locations": [{"line": 1, "column": 3}],
                "path": ["launched", 0],
            })
        );
    }
}
