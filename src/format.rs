//! Message text formatting.
//!
//! Chat content supports a deliberately tiny subset of markdown: literal
//! newlines, ``` fenced code blocks, and `inline code`. Everything else is
//! passed through verbatim. The output is structured data rather than markup,
//! so the renderer never interprets message text a second time.

/// A run of characters within one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
}

/// A block-level element of a formatted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Lines of inline runs. An empty inner vec is a blank line.
    Paragraph(Vec<Vec<Inline>>),
    /// Preformatted text, rendered as-is.
    Code(String),
}

/// Split message content into blocks.
///
/// An unterminated fence or backtick is not special: the delimiter is kept
/// as literal text.
pub fn format_text(input: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let segments: Vec<&str> = input.split("```").collect();
    let closed = segments.len() % 2 == 1;

    for (i, segment) in segments.iter().enumerate() {
        let fenced = i % 2 == 1;
        if fenced && (closed || i < segments.len() - 1) {
            blocks.push(Block::Code(segment.to_string()));
        } else if fenced {
            // Unclosed fence: restore the delimiter and treat as prose
            let literal = format!("```{}", segment);
            push_paragraph(&mut blocks, &literal);
        } else if !segment.is_empty() {
            push_paragraph(&mut blocks, segment);
        }
    }

    blocks
}

/// Flatten blocks back to plain text. Inverse of [`format_text`] up to the
/// removed delimiters; used by the CLI history printer.
pub fn to_plain(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Paragraph(lines) => {
                for (i, line) in lines.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    for inline in line {
                        match inline {
                            Inline::Text(t) | Inline::Code(t) => out.push_str(t),
                        }
                    }
                }
            }
            Block::Code(code) => out.push_str(code),
        }
    }
    out
}

fn push_paragraph(blocks: &mut Vec<Block>, text: &str) {
    let lines = text.lines().map(parse_inline).collect::<Vec<_>>();
    // str::lines drops a trailing newline; keep the blank line it implies
    let lines = if text.ends_with('\n') {
        let mut lines = lines;
        lines.push(Vec::new());
        lines
    } else {
        lines
    };
    blocks.push(Block::Paragraph(lines));
}

fn parse_inline(line: &str) -> Vec<Inline> {
    let mut runs = Vec::new();
    let segments: Vec<&str> = line.split('`').collect();
    let closed = segments.len() % 2 == 1;

    for (i, segment) in segments.iter().enumerate() {
        let ticked = i % 2 == 1;
        if ticked && (closed || i < segments.len() - 1) {
            runs.push(Inline::Code(segment.to_string()));
        } else if ticked {
            runs.push(Inline::Text(format!("`{}", segment)));
        } else if !segment.is_empty() {
            runs.push(Inline::Text(segment.to_string()));
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let blocks = format_text("hello world");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![vec![Inline::Text("hello world".to_string())]])]
        );
    }

    #[test]
    fn plain_text_is_idempotent() {
        let first = format_text("no markup here");
        let second = format_text(&to_plain(&first));
        assert_eq!(first, second);
    }

    #[test]
    fn newline_becomes_line_break() {
        let blocks = format_text("a\nb");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![
                vec![Inline::Text("a".to_string())],
                vec![Inline::Text("b".to_string())],
            ])]
        );
    }

    #[test]
    fn fenced_code_splits_out_a_block() {
        let blocks = format_text("x ```code``` y");
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph(vec![vec![Inline::Text("x ".to_string())]]),
                Block::Code("code".to_string()),
                Block::Paragraph(vec![vec![Inline::Text(" y".to_string())]]),
            ]
        );
    }

    #[test]
    fn single_backticks_mark_inline_code() {
        let blocks = format_text("run `cargo doc` now");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![vec![
                Inline::Text("run ".to_string()),
                Inline::Code("cargo doc".to_string()),
                Inline::Text(" now".to_string()),
            ]])]
        );
    }

    #[test]
    fn unclosed_fence_is_literal() {
        let blocks = format_text("before ```dangling");
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph(vec![vec![Inline::Text("before ".to_string())]]),
                Block::Paragraph(vec![vec![Inline::Text("```dangling".to_string())]]),
            ]
        );
    }

    #[test]
    fn unclosed_backtick_is_literal() {
        let blocks = format_text("a `b");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![vec![
                Inline::Text("a ".to_string()),
                Inline::Text("`b".to_string()),
            ]])]
        );
    }
}
