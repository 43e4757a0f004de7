use std::collections::HashMap;
use std::ops::Range;

use crate::block::{Block, ChunkBlock, TextBlock};
use crate::options::{ChunkOptions, OptionValue, ResultsMode};
use crate::parser::error::{ParseError, ParseErrorKind};
use crate::parser::inline;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Split raw source text into the ordered block sequence.
///
/// A chunk opens with a line `` ```{lang [name][, key=value]*} `` at
/// column 0 and closes with a line that is exactly `` ``` ``. Everything
/// between is the chunk's code, verbatim. Everything outside chunk
/// delimiters is narrative text.
pub fn parse_blocks(
    source: &str,
    file_id: usize,
    language: &str,
) -> Result<Vec<Block>, Vec<ParseError>> {
    let lines = split_lines(source);

    let mut blocks = Vec::new();
    let mut errors: Vec<ParseError> = Vec::new();
    // label -> header span of the first definition
    let mut seen_labels: HashMap<String, Range<usize>> = HashMap::new();
    let mut chunk_ordinal = 0usize;

    let mut text_start = 0usize;
    let mut i = 0usize;

    while i < lines.len() {
        let (line_start, line) = lines[i];
        let trimmed = line.trim_end_matches(['\n', '\r']);

        let Some(header) = fence_header(trimmed, language) else {
            i += 1;
            continue;
        };

        if line_start > text_start {
            blocks.push(make_text_block(source, text_start..line_start, language));
        }

        chunk_ordinal += 1;
        let header_span = line_start..line_start + trimmed.len();
        let (label, declared_label, options) = parse_header(
            header,
            chunk_ordinal,
            file_id,
            &header_span,
            &mut errors,
        );

        // Find the closing delimiter.
        let mut close: Option<usize> = None;
        for (j, (_, l)) in lines.iter().enumerate().skip(i + 1) {
            if l.trim_end_matches(['\n', '\r']) == "```" {
                close = Some(j);
                break;
            }
        }

        let Some(j) = close else {
            errors.push(ParseError::new(
                ParseErrorKind::UnterminatedChunk { name: label },
                header_span,
                file_id,
            ));
            text_start = source.len();
            break;
        };

        if let Some(first) = seen_labels.get(&label) {
            errors.push(
                ParseError::new(
                    ParseErrorKind::DuplicateChunkName { name: label.clone() },
                    header_span.clone(),
                    file_id,
                )
                .with_note(format!(
                    "first defined at bytes {}..{}",
                    first.start, first.end
                )),
            );
        } else {
            seen_labels.insert(label.clone(), header_span.clone());
        }

        let code_start = lines[i + 1].0;
        let code_end = lines[j].0;
        let span_end = lines[j].0 + lines[j].1.len();

        blocks.push(Block::Chunk(ChunkBlock {
            label,
            declared_label,
            language: language.to_string(),
            options,
            code: source[code_start..code_end].to_string(),
            span: line_start..span_end,
        }));

        text_start = span_end;
        i = j + 1;
    }

    if source.len() > text_start {
        blocks.push(make_text_block(source, text_start..source.len(), language));
    }

    if errors.is_empty() {
        Ok(blocks)
    } else {
        Err(errors)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Split source into (byte offset, line) pairs, newlines included.
fn split_lines(source: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        lines.push((offset, line));
        offset += line.len();
    }
    lines
}

fn make_text_block(source: &str, span: Range<usize>, language: &str) -> Block {
    let content = source[span.clone()].to_string();
    let inline_exprs = inline::scan(&content, language);
    Block::Text(TextBlock {
        content,
        inline_exprs,
        span,
    })
}

/// Match a chunk opening delimiter and return the header text after the
/// language tag, e.g. `"name, eval=FALSE"` for `` ```{r name, eval=FALSE} ``.
fn fence_header<'a>(line: &'a str, language: &str) -> Option<&'a str> {
    let inner = line.strip_prefix("```{")?.strip_suffix('}')?;
    let rest = inner.strip_prefix(language)?;
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with(',') {
        Some(rest.trim_start_matches([' ', ',']).trim())
    } else {
        None
    }
}

/// Parse the header remainder into a label and typed options.
/// Malformed values are pushed onto `errors`; parsing continues with
/// defaults so every bad option in the document gets reported.
fn parse_header(
    header: &str,
    ordinal: usize,
    file_id: usize,
    header_span: &Range<usize>,
    errors: &mut Vec<ParseError>,
) -> (String, bool, ChunkOptions) {
    let parts = split_options(header);
    let mut options = ChunkOptions::default();

    let (label, declared, opt_parts) = match parts.first() {
        Some(first) if !first.contains('=') => (
            first.to_string(),
            true,
            &parts[1..],
        ),
        _ => (format!("unnamed-chunk-{}", ordinal), false, &parts[..]),
    };

    for part in opt_parts {
        let Some((key, raw)) = part.split_once('=') else {
            errors.push(ParseError::new(
                ParseErrorKind::MalformedOption {
                    chunk: label.clone(),
                    key: part.to_string(),
                    detail: "expected key=value".to_string(),
                },
                header_span.clone(),
                file_id,
            ));
            continue;
        };
        let key = key.trim();
        let value = match parse_literal(raw.trim()) {
            Ok(v) => v,
            Err(detail) => {
                errors.push(ParseError::new(
                    ParseErrorKind::MalformedOption {
                        chunk: label.clone(),
                        key: key.to_string(),
                        detail,
                    },
                    header_span.clone(),
                    file_id,
                ));
                continue;
            }
        };
        if let Err(detail) = apply_option(&mut options, key, value) {
            errors.push(ParseError::new(
                ParseErrorKind::MalformedOption {
                    chunk: label.clone(),
                    key: key.to_string(),
                    detail,
                },
                header_span.clone(),
                file_id,
            ));
        }
    }

    (label, declared, options)
}

/// Split a comma-separated option list, ignoring commas inside quoted
/// string values (`fig.cap="weight, by height"`).
fn split_options(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (idx, ch) in s.char_indices() {
        match ch {
            '"' | '\'' => match quote {
                Some(q) if q == ch => quote = None,
                None => quote = Some(ch),
                _ => {}
            },
            ',' if quote.is_none() => {
                parts.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Parse an option value as a typed literal. Accepts the source
/// material's R-style capitalized booleans alongside lowercase ones.
fn parse_literal(raw: &str) -> Result<OptionValue, String> {
    match raw {
        "true" | "TRUE" => return Ok(OptionValue::Boolean(true)),
        "false" | "FALSE" => return Ok(OptionValue::Boolean(false)),
        _ => {}
    }
    if let Ok(n) = raw.parse::<f64>() {
        return Ok(OptionValue::Number(n));
    }
    if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        return Ok(OptionValue::String(raw[1..raw.len() - 1].to_string()));
    }
    Err(format!(
        "expected a boolean, number, or quoted string, got '{}'",
        raw
    ))
}

/// Apply one parsed key=value to the option set. Recognized keys are
/// type-checked; anything else lands in the passthrough bucket.
fn apply_option(options: &mut ChunkOptions, key: &str, value: OptionValue) -> Result<(), String> {
    match key {
        "eval" => options.eval = expect_bool(&value)?,
        "echo" => options.echo = expect_bool(&value)?,
        "cache" => options.cache = expect_bool(&value)?,
        "fig.cap" => match value {
            OptionValue::String(s) => options.fig_cap = Some(s),
            other => return Err(format!("expected a string, got {}", other.type_name())),
        },
        "results" => match value {
            OptionValue::String(s) if s == "show" => options.results = ResultsMode::Show,
            OptionValue::String(s) if s == "hide" => options.results = ResultsMode::Hide,
            OptionValue::String(s) => {
                return Err(format!("expected \"show\" or \"hide\", got \"{}\"", s));
            }
            other => return Err(format!("expected a string, got {}", other.type_name())),
        },
        _ => {
            options.passthrough.insert(key.to_string(), value);
        }
    }
    Ok(())
}

fn expect_bool(value: &OptionValue) -> Result<bool, String> {
    match value {
        OptionValue::Boolean(b) => Ok(*b),
        other => Err(format!("expected a boolean, got {}", other.type_name())),
    }
}
