//! Link collection from cleaned HTML
//!
//! Collects the ordered unique list of absolute URLs from `<a href>` in the
//! retained subtree. Relative hrefs have already been resolved by the
//! cleaning pass; anything still relative is resolved here against the
//! document base as a fallback.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts absolute http(s) links in document order, without duplicates
pub fn collect_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_fragment(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        // Download links point at files, not pages
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("data:")
        {
            continue;
        }

        let Ok(absolute) = base.join(href) else {
            continue;
        };
        if absolute.scheme() != "http" && absolute.scheme() != "https" {
            continue;
        }

        let link = absolute.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_collects_in_document_order() {
        let html = r#"<a href="https://example.com/b">B</a><a href="https://example.com/a">A</a>"#;
        let links = collect_links(html, &base());
        assert_eq!(
            links,
            vec!["https://example.com/b", "https://example.com/a"]
        );
    }

    #[test]
    fn test_deduplicates_preserving_first() {
        let html = r#"<a href="/x">1</a><a href="/y">2</a><a href="/x">3</a>"#;
        let links = collect_links(html, &base());
        assert_eq!(
            links,
            vec!["https://example.com/x", "https://example.com/y"]
        );
    }

    #[test]
    fn test_resolves_relative_fallback() {
        let html = r#"<a href="sub/page">rel</a>"#;
        let links = collect_links(html, &base());
        assert_eq!(links, vec!["https://example.com/sub/page"]);
    }

    #[test]
    fn test_skips_special_schemes_and_fragments() {
        let html = r##"
            <a href="javascript:void(0)">js</a>
            <a href="mailto:x@y.z">mail</a>
            <a href="tel:+123">tel</a>
            <a href="#anchor">anchor</a>
            <a href="">empty</a>
            <a href="ftp://example.com/f">ftp</a>
        "##;
        assert!(collect_links(html, &base()).is_empty());
    }

    #[test]
    fn test_skips_download_links() {
        let html = r#"<a href="/file.bin" download>get</a><a href="/page">page</a>"#;
        let links = collect_links(html, &base());
        assert_eq!(links, vec!["https://example.com/page"]);
    }
}
