//! Response paths.
//!
//! The path from the response root to the current field, as attached to
//! located errors. Paths are persistent linked lists: every field position
//! extends its parent's path without copying it, and list elements share the
//! tail up to their list.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single path segment: a field key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        Self::Field(s)
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// The response path of a field position.
#[derive(Debug, Clone, Default)]
pub struct ResponsePath {
    head: Option<Arc<PathNode>>,
}

#[derive(Debug)]
struct PathNode {
    segment: PathSegment,
    prev: Option<Arc<PathNode>>,
}

impl ResponsePath {
    /// The path of the response root.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Extends the path by one segment, leaving `self` untouched.
    #[must_use]
    pub fn push(&self, segment: impl Into<PathSegment>) -> Self {
        Self {
            head: Some(Arc::new(PathNode {
                segment: segment.into(),
                prev: self.head.clone(),
            })),
        }
    }

    /// Renders the path root-first, as it appears in error objects.
    #[must_use]
    pub fn to_vec(&self) -> Vec<PathSegment> {
        let mut out = Vec::new();
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            out.push(n.segment.clone());
            node = n.prev.as_deref();
        }
        out.reverse();
        out
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.head.is_none()
    }
}
