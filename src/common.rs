//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers, interned so that every occurrence of the same source name
/// compares and hashes by pointer instead of by content.
pub type Id = internment::Intern<String>;

/// Intern a string slice as an [`Id`].
pub fn intern(s: &str) -> Id {
    internment::Intern::new(s.to_string())
}

/// A source position used for diagnostics, derived on demand from a byte
/// offset by scanning the source for newlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for LineCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Compute the 1-based line and column of a byte offset within `source`.
pub fn line_col_of(source: &str, offset: usize) -> LineCol {
    let mut line = 1u32;
    let mut line_start = 0usize;
    for (i, b) in source.as_bytes().iter().enumerate() {
        if i >= offset {
            break;
        }
        if *b == b'\n' {
            line += 1;
            line_start = i + 1;
        }
    }
    LineCol {
        line,
        col: (offset - line_start) as u32 + 1,
    }
}

/// A single compiler diagnostic, the unit every pass's failure flag and
/// diagnostic stream deals in.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub at: Option<LineCol>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.at {
            Some(at) => write!(f, "ERROR at {at}: {}", self.message),
            None => write!(f, "ERROR: {}", self.message),
        }
    }
}

impl Diagnostic {
    pub fn new(at: LineCol, message: impl Into<String>) -> Self {
        Diagnostic {
            at: Some(at),
            message: message.into(),
        }
    }

    pub fn without_location(message: impl Into<String>) -> Self {
        Diagnostic {
            at: None,
            message: message.into(),
        }
    }
}
