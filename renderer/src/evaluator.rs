use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::EvalError;
use crate::value::Value;

/// One piece of chunk output, in production order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputArtifact {
    /// Plain textual output.
    Text(String),
    /// Tabular output.
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        caption: Option<String>,
    },
    /// Graphical output: a path to an image file the evaluator produced
    /// or references, plus an optional caption (usually from fig.cap).
    Figure {
        path: String,
        caption: Option<String>,
    },
}

/// The computation runtime that actually runs chunk code.
///
/// The engine treats the evaluator as opaque: it hands over code text
/// and the live context and gets back output artifacts or an error. A
/// failing call may leave partial bindings in the context; the engine
/// decides whether those are kept or rolled back.
pub trait Evaluator {
    /// Run a chunk's code against the context.
    fn execute(
        &mut self,
        code: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<OutputArtifact>, EvalError>;

    /// Evaluate a single inline expression and return its value.
    /// The default stringification of the result is what lands in the
    /// narrative text; any rounding or formatting is the expression's
    /// own business.
    fn eval_inline(
        &mut self,
        code: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EvalError>;
}
