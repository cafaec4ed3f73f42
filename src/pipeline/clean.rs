//! Structural HTML cleaning
//!
//! Pure transforms over a parsed DOM: selector-based removal and retention,
//! base64 image stripping, and relative URL resolution. Each transform
//! parses, walks, and re-serializes; malformed input is accepted and
//! recovered by the parser.

use crate::pipeline::PipelineError;
use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use url::Url;

/// Tags serialized without a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Attributes that carry URLs to resolve against the document base
const URL_ATTRIBUTES: &[&str] = &["href", "src", "poster", "action"];

/// Compiled cleaning configuration for one pipeline run
pub struct Cleaner {
    include: Vec<Selector>,
    exclude: Vec<Selector>,
    base: Option<Url>,
}

impl Cleaner {
    /// Compiles include/exclude selector lists
    ///
    /// Selector validity was already enforced at the options boundary;
    /// compilation failure here is still surfaced as a transform error.
    pub fn new(
        include_tags: &[String],
        exclude_tags: &[String],
        base: Option<Url>,
    ) -> Result<Self, PipelineError> {
        let compile = |selectors: &[String]| -> Result<Vec<Selector>, PipelineError> {
            selectors
                .iter()
                .map(|s| {
                    Selector::parse(s)
                        .map_err(|e| PipelineError::Transform(format!("bad selector {s}: {e}")))
                })
                .collect()
        };

        Ok(Self {
            include: compile(include_tags)?,
            exclude: compile(exclude_tags)?,
            base,
        })
    }

    /// Applies exclusion, retention, and URL resolution in document order
    ///
    /// Exclusions win over retention: a subtree matching both is removed.
    /// When include selectors are present, only matching subtrees and the
    /// elements enclosing them survive.
    pub fn clean_document(&self, html: &str) -> String {
        let document = Html::parse_document(html);

        // Retention set: matched elements plus every ancestor. Descendants
        // of a match are emitted by walking into the match.
        let keep = if self.include.is_empty() {
            None
        } else {
            let mut keep = HashSet::new();
            let mut matched = HashSet::new();
            for selector in &self.include {
                for element in document.select(selector) {
                    matched.insert(element.id());
                    keep.insert(element.id());
                    for ancestor in element.ancestors() {
                        keep.insert(ancestor.id());
                    }
                }
            }
            Some((keep, matched))
        };

        let mut out = String::with_capacity(html.len());
        for child in document.tree.root().children() {
            self.serialize(child, keep.as_ref(), false, &mut out);
        }
        out
    }

    fn is_excluded(&self, element: &ElementRef) -> bool {
        self.exclude.iter().any(|s| s.matches(element))
    }

    /// Serializes one node, applying the cleaning rules
    ///
    /// `inside_match` is true once the walk has entered a retained subtree;
    /// text directly under a mere ancestor is dropped.
    fn serialize(
        &self,
        node: NodeRef<'_, Node>,
        keep: Option<&(HashSet<ego_tree::NodeId>, HashSet<ego_tree::NodeId>)>,
        inside_match: bool,
        out: &mut String,
    ) {
        match node.value() {
            Node::Doctype(doctype) => {
                out.push_str(&format!("<!DOCTYPE {}>", doctype.name()));
            }
            Node::Text(text) => {
                if keep.is_none() || inside_match {
                    out.push_str(&escape_text(text));
                }
            }
            Node::Element(_) => {
                let Some(element) = ElementRef::wrap(node) else {
                    return;
                };
                if self.is_excluded(&element) {
                    return;
                }

                let mut now_inside = inside_match;
                if let Some((keep_set, matched)) = keep {
                    if !inside_match {
                        if !keep_set.contains(&node.id()) {
                            return;
                        }
                        if matched.contains(&node.id()) {
                            now_inside = true;
                        }
                    }
                }

                let name = element.value().name();
                out.push('<');
                out.push_str(name);
                for (attr_name, attr_value) in element.value().attrs() {
                    let value = self.rewrite_attr(attr_name, attr_value);
                    out.push(' ');
                    out.push_str(attr_name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(&value));
                    out.push('"');
                }
                out.push('>');

                if VOID_ELEMENTS.contains(&name) {
                    return;
                }

                if matches!(name, "script" | "style") {
                    // Raw text content; entity escaping would corrupt it
                    for child in node.children() {
                        if let Node::Text(text) = child.value() {
                            out.push_str(text);
                        }
                    }
                } else {
                    for child in node.children() {
                        self.serialize(child, keep, now_inside, out);
                    }
                }

                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            // Comments, processing instructions, fragments: dropped
            _ => {}
        }
    }

    fn rewrite_attr(&self, name: &str, value: &str) -> String {
        if let Some(base) = &self.base {
            if URL_ATTRIBUTES.contains(&name) && !value.is_empty() {
                let trimmed = value.trim();
                if !trimmed.starts_with("data:")
                    && !trimmed.starts_with("javascript:")
                    && !trimmed.starts_with("mailto:")
                    && !trimmed.starts_with('#')
                {
                    if let Ok(resolved) = base.join(trimmed) {
                        return resolved.to_string();
                    }
                }
            }
        }
        value.to_string()
    }
}

/// Removes `<img>` elements whose src is a data: URI
pub fn strip_base64_images(html: &str) -> String {
    let document = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    for child in document.tree.root().children() {
        // The fragment parser wraps content in a synthetic <html> element
        if let Node::Element(element) = child.value() {
            if element.name() == "html" {
                for inner in child.children() {
                    serialize_without_base64(inner, &mut out);
                }
                continue;
            }
        }
        serialize_without_base64(child, &mut out);
    }
    out
}

fn serialize_without_base64(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Doctype(doctype) => {
            out.push_str(&format!("<!DOCTYPE {}>", doctype.name()));
        }
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Element(element) => {
            if element.name() == "img" {
                let is_data = element
                    .attrs()
                    .any(|(name, value)| name == "src" && value.trim().starts_with("data:"));
                if is_data {
                    return;
                }
            }

            let name = element.name();
            out.push('<');
            out.push_str(name);
            for (attr_name, attr_value) in element.attrs() {
                out.push(' ');
                out.push_str(attr_name);
                out.push_str("=\"");
                out.push_str(&escape_attr(attr_value));
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            if matches!(name, "script" | "style") {
                for child in node.children() {
                    if let Node::Text(text) = child.value() {
                        out.push_str(text);
                    }
                }
            } else {
                for child in node.children() {
                    serialize_without_base64(child, out);
                }
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        _ => {}
    }
}

/// Returns the inner HTML of the document's `<body>`, or the whole input
/// when no body element is present (fragments)
pub fn body_inner_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("static selector");

    match document.select(&body_selector).next() {
        Some(body) => body.inner_html(),
        None => html.to_string(),
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner(include: &[&str], exclude: &[&str], base: Option<&str>) -> Cleaner {
        Cleaner::new(
            &include.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &exclude.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            base.map(|b| Url::parse(b).unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn test_exclude_removes_subtree() {
        let html = "<html><body><p>keep</p><script>evil()</script></body></html>";
        let cleaned = cleaner(&[], &["script"], None).clean_document(html);
        assert!(cleaned.contains("keep"));
        assert!(!cleaned.contains("evil"));
    }

    #[test]
    fn test_exclude_by_class() {
        let html = r#"<html><body><div class="ad">buy</div><div>content</div></body></html>"#;
        let cleaned = cleaner(&[], &[".ad"], None).clean_document(html);
        assert!(!cleaned.contains("buy"));
        assert!(cleaned.contains("content"));
    }

    #[test]
    fn test_include_keeps_match_and_ancestors() {
        let html =
            "<html><body><nav>menu</nav><article><p>story</p></article><footer>f</footer></body></html>";
        let cleaned = cleaner(&["article"], &[], None).clean_document(html);
        assert!(cleaned.contains("<article>"));
        assert!(cleaned.contains("story"));
        assert!(cleaned.contains("<body>"));
        assert!(!cleaned.contains("menu"));
        assert!(!cleaned.contains("<footer>"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let html = "<html><body><article><p>a</p><script>x()</script></article></body></html>";
        let cleaned = cleaner(&["article"], &["script"], None).clean_document(html);
        assert!(cleaned.contains("<p>a</p>"));
        assert!(!cleaned.contains("x()"));
    }

    #[test]
    fn test_relative_urls_resolved() {
        let html = r#"<html><body><a href="/about">About</a><img src="logo.png"></body></html>"#;
        let cleaned =
            cleaner(&[], &[], Some("https://example.com/dir/page")).clean_document(html);
        assert!(cleaned.contains(r#"href="https://example.com/about""#));
        assert!(cleaned.contains(r#"src="https://example.com/dir/logo.png""#));
    }

    #[test]
    fn test_special_schemes_untouched() {
        let html = r##"<html><body><a href="mailto:a@b.c">mail</a><a href="#top">top</a></body></html>"##;
        let cleaned = cleaner(&[], &[], Some("https://example.com/")).clean_document(html);
        assert!(cleaned.contains(r#"href="mailto:a@b.c""#));
        assert!(cleaned.contains(r##"href="#top""##));
    }

    #[test]
    fn test_malformed_input_recovers() {
        let html = "<p>unclosed <b>bold";
        let cleaned = cleaner(&[], &[], None).clean_document(html);
        assert!(cleaned.contains("unclosed"));
        assert!(cleaned.contains("bold"));
    }

    #[test]
    fn test_strip_base64_images() {
        let html = r#"<div><img src="data:image/png;base64,AAAA"><img src="https://a.test/x.png"></div>"#;
        let stripped = strip_base64_images(html);
        assert!(!stripped.contains("data:image"));
        assert!(stripped.contains("https://a.test/x.png"));
    }

    #[test]
    fn test_body_inner_html() {
        let html = "<html><head><title>T</title></head><body><h1>Hi</h1></body></html>";
        assert_eq!(body_inner_html(html), "<h1>Hi</h1>");
    }

    #[test]
    fn test_comments_dropped() {
        let html = "<html><body><!-- secret --><p>visible</p></body></html>";
        let cleaned = cleaner(&[], &[], None).clean_document(html);
        assert!(!cleaned.contains("secret"));
        assert!(cleaned.contains("visible"));
    }

    #[test]
    fn test_deterministic() {
        let html = r#"<html><body><div class="a" id="b">x</div></body></html>"#;
        let c = cleaner(&[], &[], None);
        assert_eq!(c.clean_document(html), c.clean_document(html));
    }
}
