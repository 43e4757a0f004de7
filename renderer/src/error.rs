use std::path::PathBuf;

use thiserror::Error;

/// An error raised by the evaluator while running chunk or inline code.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("{0}")]
    Custom(String),
}

/// A render-time failure.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("chunk '{chunk}' failed: {source}")]
    ChunkExecution {
        chunk: String,
        #[source]
        source: EvalError,
    },
    #[error("inline expression at byte {offset} failed: {source}")]
    InlineExecution {
        offset: usize,
        #[source]
        source: EvalError,
    },
    /// Another render of the same document holds the cache lock.
    #[error("cache directory '{0}' is locked by another render")]
    CacheBusy(PathBuf),
    #[error("cache I/O: {0}")]
    CacheIo(#[from] std::io::Error),
    #[error("cache entry serialization: {0}")]
    CacheSerde(#[from] serde_json::Error),
}
