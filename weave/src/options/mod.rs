use std::collections::BTreeMap;
use std::fmt;

/// A typed option literal from a chunk header.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Boolean(_) => "boolean",
            OptionValue::Number(_) => "number",
            OptionValue::String(_) => "string",
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Boolean(b) => write!(f, "{}", b),
            OptionValue::Number(n) => write!(f, "{}", n),
            OptionValue::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Whether a chunk's textual output is included in the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultsMode {
    #[default]
    Show,
    Hide,
}

/// Recognized chunk options plus a passthrough bucket for unknown keys.
/// Unknown keys are retained rather than rejected so documents written
/// for richer renderers still parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOptions {
    /// Execute the chunk's code. When false the chunk is never run and
    /// produces no output beyond its echoed source.
    pub eval: bool,
    /// Include the chunk's source text in the rendered document.
    pub echo: bool,
    /// Memoize the chunk's output keyed by its code text.
    pub cache: bool,
    /// Caption attached to graphical output produced by the chunk.
    pub fig_cap: Option<String>,
    pub results: ResultsMode,
    /// Unrecognized keys, kept verbatim.
    pub passthrough: BTreeMap<String, OptionValue>,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        ChunkOptions {
            eval: true,
            echo: true,
            cache: false,
            fig_cap: None,
            results: ResultsMode::Show,
            passthrough: BTreeMap::new(),
        }
    }
}
