//! HTML to Markdown conversion
//!
//! The converter is an opaque, deterministic function behind a trait so a
//! fixture implementation can be substituted in tests. It must not perform
//! network I/O.

use crate::pipeline::PipelineError;

pub trait MarkdownConverter: Send + Sync {
    /// Converts cleaned HTML to Markdown; deterministic for identical input
    fn convert(&self, html: &str) -> Result<String, PipelineError>;
}

/// Production converter backed by htmd
pub struct HtmdConverter;

impl MarkdownConverter for HtmdConverter {
    fn convert(&self, html: &str) -> Result<String, PipelineError> {
        htmd::convert(html).map_err(|e| PipelineError::Convert(e.to_string()))
    }
}

/// Derives plain text from Markdown by stripping formatting
///
/// Headings, emphasis, code fences, link and image syntax, blockquote and
/// list markers are removed; the visible text and its line structure
/// remain.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_fence = false;

    for line in markdown.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let mut stripped = trimmed
            .trim_start_matches('#')
            .trim_start_matches('>')
            .trim_start();

        // List markers
        if let Some(rest) = stripped
            .strip_prefix("- ")
            .or_else(|| stripped.strip_prefix("* "))
            .or_else(|| stripped.strip_prefix("+ "))
        {
            stripped = rest;
        }

        out.push_str(&strip_inline(stripped));
        out.push('\n');
    }

    // Collapse the blank-line runs left by removed markup
    let mut text = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        text.push_str(line);
        text.push('\n');
    }

    text.trim().to_string()
}

/// Strips inline emphasis, code spans, links, and images from one line
fn strip_inline(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' | '_' | '`' => {
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'[') => {
                // Image: emit the alt text, skip the target
                i += 2;
                let (label, next) = read_until(&chars, i, ']');
                out.push_str(&label);
                i = skip_link_target(&chars, next);
            }
            '[' => {
                i += 1;
                let (label, next) = read_until(&chars, i, ']');
                out.push_str(&strip_inline(&label));
                i = skip_link_target(&chars, next);
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

fn read_until(chars: &[char], mut i: usize, end: char) -> (String, usize) {
    let mut out = String::new();
    while i < chars.len() && chars[i] != end {
        out.push(chars[i]);
        i += 1;
    }
    (out, i.min(chars.len()))
}

/// Past `]`, skips a `(target)` if present; returns the next index
fn skip_link_target(chars: &[char], mut i: usize) -> usize {
    if i < chars.len() && chars[i] == ']' {
        i += 1;
    }
    if chars.get(i) == Some(&'(') {
        while i < chars.len() && chars[i] != ')' {
            i += 1;
        }
        if i < chars.len() {
            i += 1;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_htmd_basic_conversion() {
        let converter = HtmdConverter;
        let markdown = converter
            .convert("<h1>Hi</h1><p>World</p>")
            .unwrap();
        assert_eq!(markdown, "# Hi\n\nWorld");
    }

    #[test]
    fn test_htmd_deterministic() {
        let converter = HtmdConverter;
        let html = "<h2>Title</h2><ul><li>a</li><li>b</li></ul><p>tail</p>";
        let first = converter.convert(html).unwrap();
        let second = converter.convert(html).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_text_strips_headings_and_emphasis() {
        let text = markdown_to_text("# Hi\n\nSome **bold** and _italic_ text");
        assert_eq!(text, "Hi\n\nSome bold and italic text");
    }

    #[test]
    fn test_text_strips_links_keeps_labels() {
        let text = markdown_to_text("See [the docs](https://example.com/docs) for more");
        assert_eq!(text, "See the docs for more");
    }

    #[test]
    fn test_text_images_keep_alt() {
        let text = markdown_to_text("![a chart](https://example.com/c.png) caption");
        assert_eq!(text, "a chart caption");
    }

    #[test]
    fn test_text_strips_list_markers() {
        let text = markdown_to_text("- first\n- second");
        assert_eq!(text, "first\nsecond");
    }

    #[test]
    fn test_text_keeps_fenced_code_content() {
        let text = markdown_to_text("```\nlet x = 1;\n```");
        assert_eq!(text, "let x = 1;");
    }
}
