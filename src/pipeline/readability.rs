//! Main-content extraction
//!
//! A readability-style pass: boilerplate containers are dropped, candidate
//! blocks are scored by text length, link density, and tag semantics, and
//! the highest-scoring subtree is retained. Ties go to the earliest
//! candidate in document order.

use scraper::{ElementRef, Html, Selector};

/// Containers that are boilerplate regardless of content
const BOILERPLATE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "form", "iframe",
];

/// Tags considered as main-content candidates
const CANDIDATE_TAGS: &[&str] = &["main", "article", "section", "div", "td", "body"];

/// Semantic weight per candidate tag
fn tag_weight(tag: &str) -> f64 {
    match tag {
        "main" => 2.0,
        "article" => 1.8,
        "section" => 1.2,
        "div" => 1.0,
        "td" => 0.8,
        "body" => 0.5,
        _ => 0.0,
    }
}

/// Extracts the highest-scoring content subtree from a document
///
/// Returns the outer HTML of the winning candidate, with boilerplate
/// containers removed. An input with no scoring candidate comes back
/// unchanged (minus boilerplate).
pub fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut best: Option<(f64, ElementRef)> = None;

    for selector_str in CANDIDATE_TAGS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for element in document.select(&selector) {
            if is_inside_boilerplate(&element) {
                continue;
            }

            let score = score_candidate(&element);
            if score <= 0.0 {
                continue;
            }

            // Strictly greater keeps the earliest candidate on equal scores
            let better = match &best {
                None => true,
                Some((best_score, best_el)) => {
                    score > *best_score
                        || (score == *best_score && document_position(&element) < document_position(best_el))
                }
            };
            if better {
                best = Some((score, element));
            }
        }
    }

    match best {
        Some((_, element)) => serialize_without_boilerplate(&element),
        None => html.to_string(),
    }
}

/// Scores one candidate: text length, weighted by tag semantics, discounted
/// by link density
fn score_candidate(element: &ElementRef) -> f64 {
    let text_len = visible_text_len(element);
    if text_len == 0 {
        return 0.0;
    }

    let link_len = linked_text_len(element);
    let link_density = link_len as f64 / text_len as f64;

    tag_weight(element.value().name()) * text_len as f64 * (1.0 - link_density)
}

/// Total non-whitespace text length, boilerplate excluded
fn visible_text_len(element: &ElementRef) -> usize {
    let mut len = 0;
    collect_text_len(element, false, &mut len, &mut 0);
    len
}

/// Non-whitespace text length inside `<a>` descendants
fn linked_text_len(element: &ElementRef) -> usize {
    let mut linked = 0;
    collect_text_len(element, false, &mut 0, &mut linked);
    linked
}

fn collect_text_len(
    element: &ElementRef,
    in_link: bool,
    total: &mut usize,
    linked: &mut usize,
) {
    for child in element.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                let len = text.chars().filter(|c| !c.is_whitespace()).count();
                *total += len;
                if in_link {
                    *linked += len;
                }
            }
            scraper::Node::Element(el) => {
                let name = el.name();
                if BOILERPLATE_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text_len(&child_el, in_link || name == "a", total, linked);
                }
            }
            _ => {}
        }
    }
}

fn is_inside_boilerplate(element: &ElementRef) -> bool {
    element.ancestors().any(|ancestor| {
        ancestor
            .value()
            .as_element()
            .map(|el| BOILERPLATE_TAGS.contains(&el.name()))
            .unwrap_or(false)
    })
}

/// Position of an element in a pre-order traversal, for tie-breaking
fn document_position(element: &ElementRef) -> usize {
    let Some(root) = element.ancestors().last() else {
        return 0;
    };
    root.descendants()
        .position(|node| node.id() == element.id())
        .unwrap_or(0)
}

/// Serializes a subtree, dropping boilerplate containers
fn serialize_without_boilerplate(element: &ElementRef) -> String {
    let mut out = String::new();
    serialize_element(element, &mut out);
    out
}

fn serialize_element(element: &ElementRef, out: &mut String) {
    let name = element.value().name();
    if BOILERPLATE_TAGS.contains(&name) {
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attr_name, attr_value) in element.value().attrs() {
        out.push(' ');
        out.push_str(attr_name);
        out.push_str("=\"");
        out.push_str(&attr_value.replace('&', "&amp;").replace('"', "&quot;"));
        out.push('"');
    }
    out.push('>');

    let is_void = matches!(
        name,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "param" | "source" | "track" | "wbr"
    );
    if is_void {
        return;
    }

    for child in element.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                out.push_str(
                    &text
                        .replace('&', "&amp;")
                        .replace('<', "&lt;")
                        .replace('>', "&gt;"),
                );
            }
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    serialize_element(&child_el, out);
                }
            }
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(name);
    out.push('>');
}
