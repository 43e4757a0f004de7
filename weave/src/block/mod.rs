use std::ops::Range;

use crate::options::ChunkOptions;

/// A segment of a literate document.
/// Blocks are never reordered: concatenating their rendered output in
/// source order reconstructs the whole document.
#[derive(Debug, Clone)]
pub enum Block {
    Text(TextBlock),
    Chunk(ChunkBlock),
}

impl Block {
    pub fn span(&self) -> &Range<usize> {
        match self {
            Block::Text(t) => &t.span,
            Block::Chunk(c) => &c.span,
        }
    }
}

/// Narrative markup stored verbatim, with any embedded inline
/// expression markers located but not yet evaluated.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub content: String,
    /// Inline expression markers in order of appearance.
    pub inline_exprs: Vec<InlineExpr>,
    /// Byte span in source.
    pub span: Range<usize>,
}

/// An inline expression marker embedded in narrative text.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineExpr {
    /// The expression source, without the surrounding marker tokens.
    pub code: String,
    /// Byte range of the whole marker within the owning TextBlock's
    /// content. The absolute position in the source file is the block's
    /// span start plus this range (content is a verbatim slice).
    pub range: Range<usize>,
}

/// A code chunk delimited by a fenced header carrying a language tag,
/// an optional label, and a comma-separated option list.
#[derive(Debug, Clone)]
pub struct ChunkBlock {
    /// Chunk label, generated (`unnamed-chunk-N`) when not declared.
    /// Unique within the document.
    pub label: String,
    /// True if the label was written in the chunk header.
    pub declared_label: bool,
    /// Language tag from the header.
    pub language: String,
    pub options: ChunkOptions,
    /// Code between the delimiters, verbatim. Not parsed further here;
    /// the execution engine hands it to the evaluator as-is.
    pub code: String,
    /// Byte span in source, opening delimiter through closing delimiter.
    pub span: Range<usize>,
}
