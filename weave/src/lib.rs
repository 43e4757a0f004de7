pub mod block;
pub mod options;
pub mod parser;

use crate::block::Block;

/// A parsed literate document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Narrative and chunk blocks in source order.
    pub blocks: Vec<Block>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Document {
    /// Iterate over the code chunks in source order.
    pub fn chunks(&self) -> impl Iterator<Item = &block::ChunkBlock> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Chunk(chunk) => Some(chunk),
            Block::Text(_) => None,
        })
    }
}
