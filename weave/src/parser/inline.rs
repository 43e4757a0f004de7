use crate::block::InlineExpr;

/// Locate inline expression markers in narrative text without
/// evaluating them. Evaluation is deferred to the execution engine so
/// ordering with surrounding chunks stays correct.
///
/// A marker is a backtick, the language tag, a space, the expression,
/// and a closing backtick on the same logical line. An opening token
/// whose closing backtick never appears before the end of the line is
/// not an error: the text stays literal, since documents may want to
/// show the marker syntax itself. Markers do not nest.
pub fn scan(content: &str, language: &str) -> Vec<InlineExpr> {
    let open = format!("`{} ", language);
    let mut found = Vec::new();
    let mut search = 0;

    while let Some(rel) = content[search..].find(&open) {
        let start = search + rel;
        let code_start = start + open.len();
        let line_end = content[code_start..]
            .find('\n')
            .map(|p| code_start + p)
            .unwrap_or(content.len());

        match content[code_start..line_end].find('`') {
            Some(p) => {
                let code_end = code_start + p;
                found.push(InlineExpr {
                    code: content[code_start..code_end].to_string(),
                    range: start..code_end + 1,
                });
                search = code_end + 1;
            }
            None => {
                // No closing token on this line: literal text.
                search = code_start;
            }
        }
    }

    found
}
