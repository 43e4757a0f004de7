pub mod error;
pub mod inline;
mod structural;

pub use error::{ParseError, ParseErrorKind};

use crate::Document;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
    language: String,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser {
            source,
            file_id,
            language: "r".to_string(),
        }
    }

    /// Override the language tag expected in chunk headers and inline
    /// expression markers.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Parse the source into the ordered block sequence.
    /// All parse errors are fatal; none of the document executes.
    pub fn parse(&self) -> Result<Document, Vec<ParseError>> {
        let blocks = structural::parse_blocks(&self.source, self.file_id, &self.language)?;
        Ok(Document {
            blocks,
            source_id: self.file_id,
        })
    }
}
