//! Stitches rendered blocks back into one continuous output stream.
//!
//! Assembly is two-pass: the first pass numbers figure and table
//! artifacts (independently, in first-appearance order), the second
//! emits the stream in strict source order and resolves `@fig:` /
//! `@tbl:` cross-reference markers, so a reference ahead of its target
//! still gets the right number.

use std::collections::HashMap;

use pulldown_cmark::{Options, Parser as CmarkParser, html};
use tracing::warn;

use crate::engine::{RenderedBlock, RenderedDocument};
use crate::evaluator::OutputArtifact;

/// Target output format. Markdown is the native stream; Html feeds it
/// through a markdown-to-HTML conversion. Anything further (PDF and
/// friends) is a downstream collaborator's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Html,
}

pub fn assemble(doc: &RenderedDocument, format: OutputFormat) -> String {
    let (figures, tables) = number_artifacts(doc);
    let markdown = emit_markdown(doc, &figures, &tables);

    match format {
        OutputFormat::Markdown => markdown,
        OutputFormat::Html => {
            let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
            let parser = CmarkParser::new_ext(&markdown, options);
            let mut out = String::with_capacity(markdown.len() * 2);
            html::push_html(&mut out, parser);
            out
        }
    }
}

/// Pass 1: assign sequential numbers per artifact kind and map each
/// chunk label to the number of its first artifact of that kind.
fn number_artifacts(
    doc: &RenderedDocument,
) -> (HashMap<String, usize>, HashMap<String, usize>) {
    let mut figures = HashMap::new();
    let mut tables = HashMap::new();
    let mut next_figure = 1usize;
    let mut next_table = 1usize;

    for block in &doc.blocks {
        let RenderedBlock::Chunk { label, artifacts, .. } = block else {
            continue;
        };
        for artifact in artifacts {
            match artifact {
                OutputArtifact::Figure { .. } => {
                    figures.entry(label.clone()).or_insert(next_figure);
                    next_figure += 1;
                }
                OutputArtifact::Table { .. } => {
                    tables.entry(label.clone()).or_insert(next_table);
                    next_table += 1;
                }
                OutputArtifact::Text(_) => {}
            }
        }
    }

    (figures, tables)
}

/// Pass 2: emit the final stream. Caption numbering re-runs the same
/// counters in the same traversal order as pass 1, so the numbers
/// agree with the cross-reference maps.
fn emit_markdown(
    doc: &RenderedDocument,
    figures: &HashMap<String, usize>,
    tables: &HashMap<String, usize>,
) -> String {
    let mut out = String::new();
    let mut figure_no = 1usize;
    let mut table_no = 1usize;

    for block in &doc.blocks {
        match block {
            RenderedBlock::Text { content } => {
                out.push_str(&resolve_refs(content, figures, tables));
            }
            RenderedBlock::Chunk {
                label,
                language,
                echoed_code,
                artifacts,
                error,
            } => {
                if let Some(code) = echoed_code {
                    out.push_str("```");
                    out.push_str(language);
                    out.push('\n');
                    out.push_str(code);
                    if !code.ends_with('\n') && !code.is_empty() {
                        out.push('\n');
                    }
                    out.push_str("```\n\n");
                }

                if let Some(message) = error {
                    out.push_str(&format!(
                        "> **Error in chunk '{}':** {}\n\n",
                        label, message
                    ));
                }

                for artifact in artifacts {
                    match artifact {
                        OutputArtifact::Text(text) => {
                            out.push_str("```\n");
                            out.push_str(text);
                            if !text.ends_with('\n') {
                                out.push('\n');
                            }
                            out.push_str("```\n\n");
                        }
                        OutputArtifact::Table {
                            headers,
                            rows,
                            caption,
                        } => {
                            let n = table_no;
                            table_no += 1;
                            emit_table(&mut out, headers, rows);
                            if let Some(cap) = caption {
                                out.push_str(&format!("\nTable {}: {}\n", n, cap));
                            }
                            out.push('\n');
                        }
                        OutputArtifact::Figure { path, caption } => {
                            let n = figure_no;
                            figure_no += 1;
                            match caption {
                                Some(cap) => out.push_str(&format!(
                                    "![Figure {}: {}]({})\n\n",
                                    n, cap, path
                                )),
                                None => {
                                    out.push_str(&format!("![Figure {}]({})\n\n", n, path))
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    out
}

fn emit_table(out: &mut String, headers: &[String], rows: &[Vec<String>]) {
    out.push('|');
    for h in headers {
        out.push_str(&format!(" {} |", h));
    }
    out.push_str("\n|");
    for _ in headers {
        out.push_str("---|");
    }
    out.push('\n');
    for row in rows {
        out.push('|');
        for cell in row {
            out.push_str(&format!(" {} |", cell));
        }
        out.push('\n');
    }
}

/// Replace `@fig:label` and `@tbl:label` markers with assigned numbers.
/// An unresolvable reference renders as `??` and is logged; it is never
/// silently dropped.
fn resolve_refs(
    content: &str,
    figures: &HashMap<String, usize>,
    tables: &HashMap<String, usize>,
) -> String {
    let mut out = String::with_capacity(content.len());
    let mut i = 0;

    while i < content.len() {
        let rest = &content[i..];
        let map = if rest.starts_with("@fig:") {
            figures
        } else if rest.starts_with("@tbl:") {
            tables
        } else {
            let ch = rest.chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
            continue;
        };

        let label_start = i + 5;
        let label_end = content[label_start..]
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .map(|p| label_start + p)
            .unwrap_or(content.len());
        let label = &content[label_start..label_end];

        if label.is_empty() {
            out.push('@');
            i += 1;
            continue;
        }

        match map.get(label) {
            Some(n) => out.push_str(&n.to_string()),
            None => {
                warn!(label, "unresolved cross-reference");
                out.push_str("??");
            }
        }
        i = label_end;
    }

    out
}
