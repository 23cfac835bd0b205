//! Byte-offset to line/column mapping.

use serde::{Deserialize, Serialize};

/// A 1-based line/column position, as reported in response errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// Precomputed line starts for a source string.
///
/// Built once per parse and shared with the runtime so located errors can
/// render spans as line/column pairs.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    /// Maps a byte offset to its 1-based line/column.
    ///
    /// Columns count bytes; multi-byte characters before the offset on the
    /// same line widen the column accordingly.
    #[must_use]
    pub fn location(&self, offset: u32) -> SourceLocation {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        SourceLocation {
            line: line as u32 + 1,
            column: offset - self.line_starts[line] + 1,
        }
    }
}
