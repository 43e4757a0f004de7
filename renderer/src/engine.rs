use tracing::{debug, warn};

use weave::Document;
use weave::block::{Block, ChunkBlock, TextBlock};
use weave::options::ResultsMode;

use crate::cache::{CacheEntry, CacheStore};
use crate::context::ExecutionContext;
use crate::error::RenderError;
use crate::evaluator::{Evaluator, OutputArtifact};

/// What to do when a chunk fails at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the whole render, surfacing the chunk name and cause.
    #[default]
    FailFast,
    /// Annotate the failing chunk's output slot with an error marker
    /// and keep rendering.
    ContinueAndAnnotate,
}

/// Engine configuration for one render pass.
#[derive(Debug, Default)]
pub struct RenderOptions {
    pub failure_policy: FailurePolicy,
    /// Discard bindings written by a chunk that then failed. Off by
    /// default: a failed chunk's partial bindings stay visible, which
    /// makes broken documents easier to debug interactively.
    pub rollback_failed_chunks: bool,
    /// Durable chunk-output store. None disables caching entirely,
    /// including for chunks that ask for it.
    pub cache: Option<CacheStore>,
}

/// One block's resolved output. Order matches the source document.
#[derive(Debug, Clone)]
pub enum RenderedBlock {
    /// Narrative text with every inline expression substituted.
    Text { content: String },
    Chunk {
        label: String,
        language: String,
        /// Source text to echo; None when echo=false.
        echoed_code: Option<String>,
        /// Artifacts that survive the echo/results gating.
        artifacts: Vec<OutputArtifact>,
        /// Error marker, set when the chunk failed under
        /// ContinueAndAnnotate.
        error: Option<String>,
    },
}

#[derive(Debug)]
pub struct RenderedDocument {
    pub blocks: Vec<RenderedBlock>,
}

/// Walk the block sequence exactly once, in source order, threading one
/// execution context through every chunk and inline expression.
///
/// Inline expressions are evaluated at their source position against
/// the context as mutated by every chunk processed so far, never
/// against a future or stale state. This ordering is the core
/// correctness property of the renderer.
pub fn render(
    doc: &Document,
    evaluator: &mut dyn Evaluator,
    opts: &RenderOptions,
) -> Result<RenderedDocument, RenderError> {
    let mut ctx = ExecutionContext::new();
    let mut blocks = Vec::with_capacity(doc.blocks.len());

    for block in &doc.blocks {
        let rendered = match block {
            Block::Text(text) => render_text(text, evaluator, &mut ctx, opts)?,
            Block::Chunk(chunk) => render_chunk(chunk, evaluator, &mut ctx, opts)?,
        };
        blocks.push(rendered);
    }

    Ok(RenderedDocument { blocks })
}

fn render_text(
    text: &TextBlock,
    evaluator: &mut dyn Evaluator,
    ctx: &mut ExecutionContext,
    opts: &RenderOptions,
) -> Result<RenderedBlock, RenderError> {
    if text.inline_exprs.is_empty() {
        return Ok(RenderedBlock::Text {
            content: text.content.clone(),
        });
    }

    let mut out = String::with_capacity(text.content.len());
    let mut cursor = 0;

    for expr in &text.inline_exprs {
        out.push_str(&text.content[cursor..expr.range.start]);
        match evaluator.eval_inline(&expr.code, ctx) {
            Ok(value) => out.push_str(&value.to_string()),
            Err(e) => {
                let offset = text.span.start + expr.range.start;
                match opts.failure_policy {
                    FailurePolicy::FailFast => {
                        return Err(RenderError::InlineExecution { offset, source: e });
                    }
                    FailurePolicy::ContinueAndAnnotate => {
                        warn!(offset, error = %e, "inline expression failed");
                        out.push_str(&format!("[error: {}]", e));
                    }
                }
            }
        }
        cursor = expr.range.end;
    }
    out.push_str(&text.content[cursor..]);

    Ok(RenderedBlock::Text { content: out })
}

fn render_chunk(
    chunk: &ChunkBlock,
    evaluator: &mut dyn Evaluator,
    ctx: &mut ExecutionContext,
    opts: &RenderOptions,
) -> Result<RenderedBlock, RenderError> {
    let o = &chunk.options;
    let echoed_code = o.echo.then(|| chunk.code.clone());

    // eval=false: never executed, in this render or any prior one, so
    // no cache read or write happens either.
    if !o.eval {
        return Ok(done(chunk, echoed_code, Vec::new(), None));
    }

    if o.cache {
        if let Some(store) = &opts.cache {
            if let Some(entry) = store.load(&chunk.label) {
                if entry.chunk_code == chunk.code {
                    debug!(chunk = %chunk.label, "cache hit, replaying output");
                    ctx.apply_delta(&entry.context_delta);
                    let mut artifacts = entry.artifacts;
                    attach_figure_captions(&mut artifacts, o.fig_cap.as_deref());
                    return Ok(done(chunk, echoed_code, visible_artifacts(artifacts, o), None));
                }
                debug!(chunk = %chunk.label, "code changed, cache entry invalidated");
            }
        }
    }

    let snapshot = (o.cache || opts.rollback_failed_chunks).then(|| ctx.snapshot());

    match evaluator.execute(&chunk.code, ctx) {
        Ok(mut artifacts) => {
            // Entries are saved uncaptioned: fig.cap lives in the chunk
            // header, not the code text, so an edit to it must show
            // through a cache hit just like echo and results do.
            if o.cache {
                if let (Some(store), Some(snapshot)) = (&opts.cache, &snapshot) {
                    let entry = CacheEntry {
                        chunk_code: chunk.code.clone(),
                        artifacts: artifacts.clone(),
                        context_delta: ctx.delta_since(snapshot),
                    };
                    store.save(&chunk.label, &entry)?;
                }
            }
            attach_figure_captions(&mut artifacts, o.fig_cap.as_deref());
            Ok(done(chunk, echoed_code, visible_artifacts(artifacts, o), None))
        }
        Err(e) => {
            if opts.rollback_failed_chunks {
                if let Some(snapshot) = snapshot {
                    ctx.restore(snapshot);
                }
            }
            match opts.failure_policy {
                FailurePolicy::FailFast => Err(RenderError::ChunkExecution {
                    chunk: chunk.label.clone(),
                    source: e,
                }),
                FailurePolicy::ContinueAndAnnotate => {
                    warn!(chunk = %chunk.label, error = %e, "chunk failed, continuing");
                    Ok(done(chunk, echoed_code, Vec::new(), Some(e.to_string())))
                }
            }
        }
    }
}

fn done(
    chunk: &ChunkBlock,
    echoed_code: Option<String>,
    artifacts: Vec<OutputArtifact>,
    error: Option<String>,
) -> RenderedBlock {
    RenderedBlock::Chunk {
        label: chunk.label.clone(),
        language: chunk.language.clone(),
        echoed_code,
        artifacts,
        error,
    }
}

/// results=hide drops textual output; tables and figures still show.
fn visible_artifacts(
    artifacts: Vec<OutputArtifact>,
    options: &weave::options::ChunkOptions,
) -> Vec<OutputArtifact> {
    match options.results {
        ResultsMode::Show => artifacts,
        ResultsMode::Hide => artifacts
            .into_iter()
            .filter(|a| !matches!(a, OutputArtifact::Text(_)))
            .collect(),
    }
}

/// fig.cap applies to every figure the chunk produced that does not
/// already carry its own caption.
fn attach_figure_captions(artifacts: &mut [OutputArtifact], fig_cap: Option<&str>) {
    let Some(cap) = fig_cap else { return };
    for artifact in artifacts {
        if let OutputArtifact::Figure { caption, .. } = artifact {
            if caption.is_none() {
                *caption = Some(cap.to_string());
            }
        }
    }
}
