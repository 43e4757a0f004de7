use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

/// What went wrong while parsing a document.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// An option value that is not a boolean, number, or quoted string,
    /// or a recognized key holding a value of the wrong type.
    MalformedOption {
        chunk: String,
        key: String,
        detail: String,
    },
    /// Two chunks carry the same label.
    DuplicateChunkName { name: String },
    /// A chunk opening delimiter with no matching closing delimiter.
    UnterminatedChunk { name: String },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::MalformedOption { chunk, key, detail } => {
                write!(f, "malformed option '{}' in chunk '{}': {}", key, chunk, detail)
            }
            ParseErrorKind::DuplicateChunkName { name } => {
                write!(f, "duplicate chunk name '{}'", name)
            }
            ParseErrorKind::UnterminatedChunk { name } => {
                write!(f, "unterminated chunk '{}': no closing delimiter before end of file", name)
            }
        }
    }
}

/// A parse error with source location information.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Range<usize>,
    pub file_id: usize,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Range<usize>, file_id: usize) -> Self {
        ParseError {
            kind,
            span,
            file_id,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        Diagnostic::new(Severity::Error)
            .with_message(self.kind.to_string())
            .with_labels(vec![Label::primary(self.file_id, self.span.clone())])
            .with_notes(self.notes.clone())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for ParseError {}
