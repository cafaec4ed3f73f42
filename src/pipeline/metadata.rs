//! Page metadata extraction
//!
//! Pulls `<title>`, meta description, Open Graph tags, and the document
//! language out of the (cleaned) document head.

use scraper::{Html, Selector};
use std::collections::HashMap;

/// Extracted page metadata
#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,

    /// Every `<meta name|property>` with content, keyed by name
    pub all: HashMap<String, String>,
}

/// Extracts metadata from an HTML document
pub fn extract_metadata(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);
    let mut metadata = PageMetadata::default();

    if let Ok(selector) = Selector::parse("title") {
        metadata.title = document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());
    }

    if let Ok(selector) = Selector::parse("html[lang]") {
        metadata.language = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("lang"))
            .map(|lang| lang.trim().to_string())
            .filter(|l| !l.is_empty());
    }

    if let Ok(selector) = Selector::parse("meta") {
        for element in document.select(&selector) {
            let Some(content) = element.value().attr("content") else {
                continue;
            };
            let key = element
                .value()
                .attr("name")
                .or_else(|| element.value().attr("property"));
            let Some(key) = key else {
                continue;
            };

            metadata
                .all
                .entry(key.to_string())
                .or_insert_with(|| content.to_string());
        }
    }

    metadata.description = metadata
        .all
        .get("description")
        .or_else(|| metadata.all.get("og:description"))
        .cloned();

    if metadata.title.is_none() {
        metadata.title = metadata.all.get("og:title").cloned();
    }

    if let Some(title) = &metadata.title {
        metadata
            .all
            .entry("title".to_string())
            .or_insert_with(|| title.clone());
    }

    metadata
}
