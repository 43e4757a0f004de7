use weave::block::Block;
use weave::options::{OptionValue, ResultsMode};
use weave::parser::{ParseError, ParseErrorKind, Parser};

fn parse(source: &str) -> weave::Document {
    Parser::new(source.to_string(), 0)
        .parse()
        .expect("parse failed")
}

fn parse_err(source: &str) -> Vec<ParseError> {
    Parser::new(source.to_string(), 0)
        .parse()
        .expect_err("expected parse failure")
}

fn chunk(block: &Block) -> &weave::block::ChunkBlock {
    match block {
        Block::Chunk(c) => c,
        Block::Text(t) => panic!("expected chunk, got text {:?}", t.content),
    }
}

fn text(block: &Block) -> &weave::block::TextBlock {
    match block {
        Block::Text(t) => t,
        Block::Chunk(c) => panic!("expected text, got chunk '{}'", c.label),
    }
}

#[test]
fn splits_text_and_chunks_in_order() {
    let src = "before\n```{r setup}\nx = 1\n```\nafter\n";
    let doc = parse(src);
    assert_eq!(doc.blocks.len(), 3);
    assert_eq!(text(&doc.blocks[0]).content, "before\n");
    let c = chunk(&doc.blocks[1]);
    assert_eq!(c.label, "setup");
    assert!(c.declared_label);
    assert_eq!(c.code, "x = 1\n");
    assert_eq!(text(&doc.blocks[2]).content, "after\n");
}

#[test]
fn chunk_code_is_verbatim() {
    let src = "```{r raw}\n  indented = 1  # comment\n\nblank line above\n```\n";
    let doc = parse(src);
    let c = chunk(&doc.blocks[0]);
    assert_eq!(c.code, "  indented = 1  # comment\n\nblank line above\n");
}

#[test]
fn unnamed_chunks_get_generated_labels() {
    let src = "```{r}\na = 1\n```\n\n```{r}\nb = 2\n```\n";
    let doc = parse(src);
    let labels: Vec<_> = doc.chunks().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, ["unnamed-chunk-1", "unnamed-chunk-2"]);
    assert!(doc.chunks().all(|c| !c.declared_label));
}

#[test]
fn recognized_options_are_typed() {
    let src = "```{r opts, eval=FALSE, echo=false, cache=TRUE, fig.cap=\"A plot\", results='hide'}\n```\n";
    let doc = parse(src);
    let o = &chunk(&doc.blocks[0]).options;
    assert!(!o.eval);
    assert!(!o.echo);
    assert!(o.cache);
    assert_eq!(o.fig_cap.as_deref(), Some("A plot"));
    assert_eq!(o.results, ResultsMode::Hide);
}

#[test]
fn defaults_when_no_options_given() {
    let doc = parse("```{r bare}\n```\n");
    let o = &chunk(&doc.blocks[0]).options;
    assert!(o.eval);
    assert!(o.echo);
    assert!(!o.cache);
    assert_eq!(o.fig_cap, None);
    assert_eq!(o.results, ResultsMode::Show);
    assert!(o.passthrough.is_empty());
}

#[test]
fn unknown_keys_pass_through() {
    let src = "```{r fig, fig.width=7, dev=\"png\"}\n```\n";
    let doc = parse(src);
    let o = &chunk(&doc.blocks[0]).options;
    assert_eq!(o.passthrough.get("fig.width"), Some(&OptionValue::Number(7.0)));
    assert_eq!(
        o.passthrough.get("dev"),
        Some(&OptionValue::String("png".to_string()))
    );
}

#[test]
fn quoted_string_value_may_contain_commas() {
    let src = "```{r plot, fig.cap=\"weight, by height\"}\n```\n";
    let doc = parse(src);
    let o = &chunk(&doc.blocks[0]).options;
    assert_eq!(o.fig_cap.as_deref(), Some("weight, by height"));
}

#[test]
fn unparseable_option_value_fails_the_parse() {
    let errors = parse_err("```{r bad, eval=maybe}\n```\n");
    assert_eq!(errors.len(), 1);
    match &errors[0].kind {
        ParseErrorKind::MalformedOption { chunk, key, .. } => {
            assert_eq!(chunk, "bad");
            assert_eq!(key, "eval");
        }
        other => panic!("expected MalformedOption, got {:?}", other),
    }
}

#[test]
fn wrong_type_for_recognized_key_fails() {
    let errors = parse_err("```{r bad, cache=\"yes\"}\n```\n");
    assert!(matches!(
        errors[0].kind,
        ParseErrorKind::MalformedOption { ref key, .. } if key == "cache"
    ));
}

#[test]
fn invalid_results_mode_fails() {
    let errors = parse_err("```{r bad, results=\"verbatim\"}\n```\n");
    assert!(matches!(
        errors[0].kind,
        ParseErrorKind::MalformedOption { ref key, .. } if key == "results"
    ));
}

#[test]
fn duplicate_chunk_names_fail_before_execution() {
    let src = "```{r alpha}\na = 1\n```\n\n```{r alpha}\nb = 2\n```\n";
    let errors = parse_err(src);
    assert!(matches!(
        errors[0].kind,
        ParseErrorKind::DuplicateChunkName { ref name } if name == "alpha"
    ));
}

#[test]
fn unterminated_chunk_fails() {
    let errors = parse_err("text\n```{r open}\nx = 1\n");
    assert!(matches!(
        errors[0].kind,
        ParseErrorKind::UnterminatedChunk { ref name } if name == "open"
    ));
}

#[test]
fn indented_fence_is_narrative_text() {
    let src = " ```{r not-a-chunk}\nx\n```\n";
    let doc = parse(src);
    assert_eq!(doc.chunks().count(), 0);
}

#[test]
fn inline_marker_located_without_evaluation() {
    let src = "The mean is `r mean_x` today.\n";
    let doc = parse(src);
    let t = text(&doc.blocks[0]);
    assert_eq!(t.inline_exprs.len(), 1);
    let expr = &t.inline_exprs[0];
    assert_eq!(expr.code, "mean_x");
    assert_eq!(&t.content[expr.range.clone()], "`r mean_x`");
}

#[test]
fn multiple_markers_on_one_line() {
    let src = "`r a` and `r b`\n";
    let doc = parse(src);
    let t = text(&doc.blocks[0]);
    let codes: Vec<_> = t.inline_exprs.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(codes, ["a", "b"]);
}

#[test]
fn marker_without_closing_token_is_literal() {
    let src = "shows the syntax: `r some code with no close\nnext `r x` line\n";
    let doc = parse(src);
    let t = text(&doc.blocks[0]);
    // The unterminated opener stays literal; the later marker is found.
    assert_eq!(t.inline_exprs.len(), 1);
    assert_eq!(t.inline_exprs[0].code, "x");
}

#[test]
fn custom_language_tag() {
    let src = "value `py n`\n```{py calc}\nn = 1\n```\n";
    let doc = Parser::new(src.to_string(), 0)
        .with_language("py")
        .parse()
        .expect("parse failed");
    assert_eq!(doc.chunks().count(), 1);
    assert_eq!(text(&doc.blocks[0]).inline_exprs[0].code, "n");
}

#[test]
fn multiple_errors_reported_together() {
    let src = "```{r a, eval=nope}\n```\n\n```{r b, echo=2}\n```\n";
    let errors = parse_err(src);
    assert_eq!(errors.len(), 2);
}
