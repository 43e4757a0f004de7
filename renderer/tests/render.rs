use renderer::{
    CacheStore, EvalError, Evaluator, ExecutionContext, FailurePolicy, OutputArtifact,
    OutputFormat, RenderError, RenderOptions, ScriptEvaluator, Value, assemble, render,
};

fn doc(source: &str) -> weave::Document {
    weave::parser::Parser::new(source.to_string(), 0)
        .parse()
        .expect("parse failed")
}

fn render_with(source: &str, opts: &RenderOptions) -> Result<String, RenderError> {
    let document = doc(source);
    let mut evaluator = ScriptEvaluator::new();
    let rendered = render(&document, &mut evaluator, opts)?;
    Ok(assemble(&rendered, OutputFormat::Markdown))
}

fn render_markdown(source: &str) -> String {
    render_with(source, &RenderOptions::default()).expect("render failed")
}

/// Wraps the script evaluator and counts chunk executions, to observe
/// whether the cache actually short-circuits the evaluator.
struct CountingEvaluator {
    inner: ScriptEvaluator,
    executions: usize,
}

impl CountingEvaluator {
    fn new() -> Self {
        CountingEvaluator {
            inner: ScriptEvaluator::new(),
            executions: 0,
        }
    }
}

impl Evaluator for CountingEvaluator {
    fn execute(
        &mut self,
        code: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<OutputArtifact>, EvalError> {
        self.executions += 1;
        self.inner.execute(code, ctx)
    }

    fn eval_inline(
        &mut self,
        code: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EvalError> {
        self.inner.eval_inline(code, ctx)
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn inline_expressions_see_only_earlier_chunks() {
    let src = "```{r a}\nn = 50\n```\nn is `r n`.\n```{r b}\nn = 30\n```\nn is now `r n`.\n";
    let out = render_markdown(src);
    assert!(out.contains("n is 50."), "got: {}", out);
    assert!(out.contains("n is now 30."), "got: {}", out);
}

#[test]
fn bare_expression_value_becomes_text_output() {
    let out = render_markdown("```{r calc}\n2 + 3\n```\n");
    assert!(out.contains("```\n5\n```"), "got: {}", out);
}

#[test]
fn inline_arithmetic_and_precedence() {
    assert!(render_markdown("x is `r 2 + 3 * 4`\n").contains("x is 14"));
    assert!(render_markdown("`r (2 + 3) * 4`\n").contains("20"));
    assert!(render_markdown("`r 2 ^ 3`\n").contains("8"));
    assert!(render_markdown("`r 10 * 4 ^ 0.5`\n").contains("20"));
}

#[test]
fn inline_builtins() {
    assert!(render_markdown("`r round(3.14159, 2)`\n").contains("3.14"));
    assert!(render_markdown("`r paste(\"n\", \"=\", 5)`\n").contains("n = 5"));
    assert!(render_markdown("`r sqrt(16)`\n").contains("4"));
}

#[test]
fn leading_dot_number_literal() {
    assert!(render_markdown("`r .5 * 4`\n").contains("2"));
    assert!(render_markdown("half is `r .5`\n").contains("half is 0.5"));
}

#[test]
fn unterminated_inline_marker_renders_literally() {
    let out = render_markdown("shows `r the syntax itself\n");
    assert!(out.contains("shows `r the syntax itself"), "got: {}", out);
}

// ---------------------------------------------------------------------------
// Chunk options
// ---------------------------------------------------------------------------

#[test]
fn echo_false_hides_code_but_executes() {
    let src = "```{r hidden, echo=FALSE}\nn = 50\nn\n```\n";
    let out = render_markdown(src);
    assert!(out.contains("```\n50\n```"), "got: {}", out);
    assert!(!out.contains("n = 50"), "got: {}", out);
}

#[test]
fn eval_false_shows_code_without_executing() {
    let out = render_markdown("```{r model, eval=FALSE}\ny = 10 * x ^ 1.5\n```\n");
    assert!(out.contains("y = 10 * x ^ 1.5"), "got: {}", out);
}

#[test]
fn eval_false_leaves_no_binding() {
    let src = "```{r model, eval=FALSE}\ny = 1\n```\n```{r after}\ny\n```\n";
    let err = render_with(src, &RenderOptions::default()).unwrap_err();
    match err {
        RenderError::ChunkExecution { chunk, .. } => assert_eq!(chunk, "after"),
        other => panic!("expected ChunkExecution, got {}", other),
    }
}

#[test]
fn results_hide_drops_text_output() {
    let src = "```{r quietly, results=\"hide\"}\n1 + 1\n```\n";
    let out = render_markdown(src);
    assert!(out.contains("1 + 1"), "code still echoed: {}", out);
    assert!(!out.contains("```\n2\n```"), "got: {}", out);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[test]
fn fail_fast_surfaces_chunk_name() {
    let err = render_with("```{r boom}\nb + 1\n```\n", &RenderOptions::default()).unwrap_err();
    match err {
        RenderError::ChunkExecution { chunk, source } => {
            assert_eq!(chunk, "boom");
            assert!(matches!(source, EvalError::UndefinedVariable(ref v) if v == "b"));
        }
        other => panic!("expected ChunkExecution, got {}", other),
    }
}

#[test]
fn continue_and_annotate_keeps_rendering() {
    let src = "```{r boom}\na = 1\nb + 1\n```\na is `r a`.\n```{r later}\n40 + 2\n```\n";
    let opts = RenderOptions {
        failure_policy: FailurePolicy::ContinueAndAnnotate,
        ..Default::default()
    };
    let out = render_with(src, &opts).expect("render failed");
    assert!(out.contains("Error in chunk 'boom'"), "got: {}", out);
    // Bindings written before the failure point stay visible.
    assert!(out.contains("a is 1."), "got: {}", out);
    assert!(out.contains("```\n42\n```"), "got: {}", out);
}

#[test]
fn rollback_discards_failed_chunk_bindings() {
    let src = "```{r boom}\na = 1\nb + 1\n```\na is `r a`.\n";
    let opts = RenderOptions {
        failure_policy: FailurePolicy::ContinueAndAnnotate,
        rollback_failed_chunks: true,
        ..Default::default()
    };
    let out = render_with(src, &opts).expect("render failed");
    assert!(!out.contains("a is 1."), "got: {}", out);
    assert!(out.contains("a is [error:"), "got: {}", out);
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

fn cached_opts(dir: &std::path::Path) -> RenderOptions {
    RenderOptions {
        cache: Some(CacheStore::open(dir).expect("cache open failed")),
        ..Default::default()
    }
}

fn entry_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let Ok(items) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    items
        .filter_map(|item| item.ok())
        .map(|item| item.path())
        .filter(|path| path.extension().is_some_and(|e| e == "json"))
        .collect()
}

#[test]
fn cache_hit_skips_the_evaluator() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    let document = doc("```{r big, cache=TRUE}\nn = 50\n```\nn is `r n`.\n");
    let mut counting = CountingEvaluator::new();

    let opts = cached_opts(&cache_dir);
    let first = render(&document, &mut counting, &opts).unwrap();
    let first = assemble(&first, OutputFormat::Markdown);
    drop(opts);
    assert_eq!(counting.executions, 1);

    let opts = cached_opts(&cache_dir);
    let second = render(&document, &mut counting, &opts).unwrap();
    let second = assemble(&second, OutputFormat::Markdown);
    assert_eq!(counting.executions, 1, "cache hit must not re-execute");
    // Replayed context delta keeps the binding visible downstream.
    assert!(second.contains("n is 50."), "got: {}", second);
    assert_eq!(first, second);
}

#[test]
fn one_character_change_invalidates_the_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    let mut counting = CountingEvaluator::new();

    let opts = cached_opts(&cache_dir);
    let original = doc("```{r big, cache=TRUE}\nn = 50\n```\n`r n`\n");
    render(&original, &mut counting, &opts).unwrap();
    drop(opts);

    let opts = cached_opts(&cache_dir);
    let edited = doc("```{r big, cache=TRUE}\nn = 51\n```\n`r n`\n");
    let out = render(&edited, &mut counting, &opts).unwrap();
    assert_eq!(counting.executions, 2);
    assert!(assemble(&out, OutputFormat::Markdown).contains("51"));
}

#[test]
fn corrupt_cache_entry_is_a_miss() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    let document = doc("```{r big, cache=TRUE}\nn = 50\n```\n`r n`\n");
    let mut counting = CountingEvaluator::new();

    let opts = cached_opts(&cache_dir);
    render(&document, &mut counting, &opts).unwrap();
    drop(opts);

    let entries = entry_files(&cache_dir);
    assert_eq!(entries.len(), 1);
    std::fs::write(&entries[0], "not json at all").unwrap();

    let opts = cached_opts(&cache_dir);
    let out = render(&document, &mut counting, &opts).unwrap();
    assert_eq!(counting.executions, 2, "corruption must force re-execution");
    assert!(assemble(&out, OutputFormat::Markdown).contains("50"));
}

#[test]
fn eval_false_never_touches_the_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    let document = doc("```{r off, eval=FALSE, cache=TRUE}\nn = 50\n```\n");
    let mut counting = CountingEvaluator::new();

    let opts = cached_opts(&cache_dir);
    render(&document, &mut counting, &opts).unwrap();
    assert_eq!(counting.executions, 0);
    assert!(entry_files(&cache_dir).is_empty());
}

#[test]
fn editing_fig_cap_takes_effect_on_cache_hit() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    let mut counting = CountingEvaluator::new();

    let opts = cached_opts(&cache_dir);
    let original = doc("```{r plot, cache=TRUE, fig.cap=\"Old caption\"}\nfigure(\"p.png\")\n```\n");
    render(&original, &mut counting, &opts).unwrap();
    drop(opts);

    let opts = cached_opts(&cache_dir);
    let edited = doc("```{r plot, cache=TRUE, fig.cap=\"New caption\"}\nfigure(\"p.png\")\n```\n");
    let out = render(&edited, &mut counting, &opts).unwrap();
    let out = assemble(&out, OutputFormat::Markdown);
    assert_eq!(counting.executions, 1, "a caption edit must not invalidate");
    assert!(out.contains("New caption"), "got: {}", out);
    assert!(!out.contains("Old caption"), "got: {}", out);
}

#[test]
fn failed_render_releases_the_lock_on_drop() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    let document = doc("```{r boom}\nb + 1\n```\n");
    let mut evaluator = ScriptEvaluator::new();

    let opts = cached_opts(&cache_dir);
    assert!(render(&document, &mut evaluator, &opts).is_err());
    drop(opts);

    assert!(CacheStore::open(&cache_dir).is_ok());
}

#[test]
fn stale_lock_can_be_broken() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    std::fs::create_dir_all(&cache_dir).unwrap();
    // A crashed render leaves the lock file behind.
    std::fs::write(cache_dir.join(".render-lock"), "").unwrap();

    assert!(matches!(
        CacheStore::open(&cache_dir),
        Err(RenderError::CacheBusy(_))
    ));
    CacheStore::break_lock(&cache_dir).unwrap();
    let store = CacheStore::open(&cache_dir).unwrap();
    store.clear().unwrap();
}

#[test]
fn similar_labels_get_distinct_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let store = CacheStore::open(tmp.path().join("doc")).unwrap();
    let entry = |text: &str| renderer::CacheEntry {
        chunk_code: "x = 1\n".to_string(),
        artifacts: vec![OutputArtifact::Text(text.to_string())],
        context_delta: std::collections::BTreeMap::new(),
    };

    store.save("a.b", &entry("dot")).unwrap();
    store.save("a_b", &entry("underscore")).unwrap();

    let loaded = store.load("a.b").expect("entry for a.b");
    assert_eq!(loaded.artifacts, vec![OutputArtifact::Text("dot".to_string())]);
    let loaded = store.load("a_b").expect("entry for a_b");
    assert_eq!(
        loaded.artifacts,
        vec![OutputArtifact::Text("underscore".to_string())]
    );
}

#[test]
fn concurrent_renders_of_one_document_are_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    let _held = CacheStore::open(&cache_dir).unwrap();
    match CacheStore::open(&cache_dir) {
        Err(RenderError::CacheBusy(_)) => {}
        other => panic!("expected CacheBusy, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn clearing_the_cache_forces_re_execution() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("doc");
    let document = doc("```{r big, cache=TRUE}\nn = 50\n```\n");
    let mut counting = CountingEvaluator::new();

    let opts = cached_opts(&cache_dir);
    render(&document, &mut counting, &opts).unwrap();
    opts.cache.as_ref().unwrap().clear().unwrap();
    drop(opts);

    let opts = cached_opts(&cache_dir);
    render(&document, &mut counting, &opts).unwrap();
    assert_eq!(counting.executions, 2);
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[test]
fn forward_references_resolve_after_assembly() {
    let src = "See Figure @fig:plot and Table @tbl:tab.\n\
               ```{r plot, fig.cap=\"Weight by height\"}\nfigure(\"plot.png\")\n```\n\
               ```{r tab}\ntable(\"Name, Age\", \"Alice, 30\")\n```\n";
    let out = render_markdown(src);
    assert!(out.contains("See Figure 1 and Table 1."), "got: {}", out);
    assert!(
        out.contains("![Figure 1: Weight by height](plot.png)"),
        "got: {}",
        out
    );
    assert!(out.contains("| Name | Age |"), "got: {}", out);
    assert!(out.contains("| Alice | 30 |"), "got: {}", out);
}

#[test]
fn figures_and_tables_number_independently() {
    let src = "```{r one}\nfigure(\"a.png\")\n```\n\
               ```{r two}\ntable(\"X\", \"1\")\n```\n\
               ```{r three}\nfigure(\"b.png\")\n```\n\
               Figure @fig:three, table @tbl:two.\n";
    let out = render_markdown(src);
    assert!(out.contains("![Figure 2](b.png)"), "got: {}", out);
    assert!(out.contains("Figure 2, table 1."), "got: {}", out);
}

#[test]
fn unresolved_reference_renders_as_question_marks() {
    let out = render_markdown("see @fig:missing here\n");
    assert!(out.contains("see ?? here"), "got: {}", out);
}

#[test]
fn rendering_is_idempotent() {
    let src = "intro `r 1 + 1`\n```{r c}\nx = 2\nx * 3\n```\ndone\n";
    assert_eq!(render_markdown(src), render_markdown(src));
}

#[test]
fn html_output_goes_through_markdown_conversion() {
    let document = doc("Hello *world*\n```{r c, echo=FALSE}\n1 + 1\n```\n");
    let mut evaluator = ScriptEvaluator::new();
    let rendered = render(&document, &mut evaluator, &RenderOptions::default()).unwrap();
    let html = assemble(&rendered, OutputFormat::Html);
    assert!(html.contains("<em>world</em>"), "got: {}", html);
    assert!(html.contains("<code>"), "got: {}", html);
}
