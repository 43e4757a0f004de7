pub mod assemble;
pub mod cache;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod script;
pub mod value;

pub use assemble::{OutputFormat, assemble};
pub use cache::{CacheEntry, CacheStore};
pub use context::ExecutionContext;
pub use engine::{FailurePolicy, RenderOptions, RenderedBlock, RenderedDocument, render};
pub use error::{EvalError, RenderError};
pub use evaluator::{Evaluator, OutputArtifact};
pub use script::ScriptEvaluator;
pub use value::Value;
