//! Content pipeline
//!
//! Turns one fetched page into a [`Document`]. The transform order is
//! fixed: structural selectors, then readability, then base64 stripping,
//! then URL resolution and link collection, with Markdown conversion last.
//! Given identical raw HTML and options the output is byte-identical.

mod clean;
mod extract;
mod links;
mod markdown;
mod metadata;
mod readability;

pub use clean::{body_inner_html, strip_base64_images, Cleaner};
pub use extract::{DisabledExtractor, Extractor, HttpExtractor};
pub use links::collect_links;
pub use markdown::{markdown_to_text, HtmdConverter, MarkdownConverter};
pub use metadata::{extract_metadata, PageMetadata};
pub use readability::extract_main_content;

use crate::document::Document;
use crate::fetch::FetchResult;
use crate::options::{Format, ScrapeOptions};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Errors from the content pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transform failed: {0}")]
    Transform(String),

    #[error("markdown conversion failed: {0}")]
    Convert(String),

    #[error("invalid document base URL: {0}")]
    BadBaseUrl(String),
}

/// The assembled pipeline, shared by all workers
pub struct ContentPipeline {
    converter: Arc<dyn MarkdownConverter>,
    extractor: Arc<dyn Extractor>,
}

impl ContentPipeline {
    pub fn new(converter: Arc<dyn MarkdownConverter>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            converter,
            extractor,
        }
    }

    /// Runs the full pipeline, including the extraction step
    pub async fn run(
        &self,
        source_url: &str,
        fetch: &FetchResult,
        options: &ScrapeOptions,
    ) -> Result<Document, PipelineError> {
        let mut document = self.transform(source_url, fetch, options)?;

        if options.wants(Format::Extract) {
            if let Some(extract_options) = &options.extract {
                let text = document.text.as_deref().unwrap_or_default();
                match self.extractor.extract(text, extract_options).await {
                    Ok(value) => document.extract = Some(value),
                    // Non-fatal: deliver the document with the error attached
                    Err(record) => document.error = Some(record),
                }
            }
        }

        Ok(document)
    }

    /// Runs the deterministic transform steps
    pub fn transform(
        &self,
        source_url: &str,
        fetch: &FetchResult,
        options: &ScrapeOptions,
    ) -> Result<Document, PipelineError> {
        let base =
            Url::parse(&fetch.final_url).map_err(|e| PipelineError::BadBaseUrl(e.to_string()))?;

        let cleaner = Cleaner::new(
            &options.include_tags,
            &options.exclude_tags,
            Some(base.clone()),
        )?;
        let cleaned_document = cleaner.clean_document(&fetch.body);

        let page_metadata = extract_metadata(&cleaned_document);

        let mut content = if options.only_main_content {
            extract_main_content(&cleaned_document)
        } else {
            body_inner_html(&cleaned_document)
        };

        if options.remove_base64_images {
            content = strip_base64_images(&content);
        }

        let links = collect_links(&content, &base);

        let markdown = self.converter.convert(&content)?;
        let text = markdown_to_text(&markdown);

        let mut document = Document::new(source_url, fetch.final_url.clone(), fetch.status_code);
        document.markdown = Some(markdown);
        document.text = Some(text);
        document.links = links;
        document.title = page_metadata.title;
        document.description = page_metadata.description;
        document.language = page_metadata.language;
        document.metadata = page_metadata.all;

        if options.wants(Format::Html) {
            document.html = Some(if options.only_main_content {
                content
            } else {
                cleaned_document
            });
        }
        if options.wants(Format::RawHtml) {
            document.raw_html = Some(fetch.body.clone());
        }
        if options.wants(Format::Screenshot) {
            document.screenshot = fetch.screenshot.clone();
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn pipeline() -> ContentPipeline {
        ContentPipeline::new(Arc::new(HtmdConverter), Arc::new(DisabledExtractor))
    }

    fn fetched(body: &str) -> FetchResult {
        FetchResult {
            final_url: "https://example.com/".to_string(),
            status_code: 200,
            headers: HashMap::new(),
            body: body.to_string(),
            screenshot: None,
            timing: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_basic_markdown_and_title() {
        let html =
            "<html><head><title>Example</title></head><body><h1>Hi</h1><p>World</p></body></html>";
        let doc = pipeline()
            .transform("https://example.com/", &fetched(html), &ScrapeOptions::default())
            .unwrap();

        assert_eq!(doc.markdown.as_deref(), Some("# Hi\n\nWorld"));
        assert_eq!(doc.title.as_deref(), Some("Example"));
        assert_eq!(doc.metadata.get("title").map(String::as_str), Some("Example"));
    }

    #[test]
    fn test_only_main_content() {
        let html = "<html><body><nav>Home About</nav><main><h1>Main</h1></main><footer>foot</footer></body></html>";
        let options = ScrapeOptions {
            only_main_content: true,
            ..Default::default()
        };
        let doc = pipeline()
            .transform("https://example.com/", &fetched(html), &options)
            .unwrap();

        assert_eq!(doc.markdown.as_deref(), Some("# Main"));
    }

    #[test]
    fn test_exclude_tags_remove_scripts() {
        let html = "<html><body><p>safe</p><script>evil()</script></body></html>";
        let options = ScrapeOptions {
            exclude_tags: vec!["script".to_string(), "style".to_string()],
            ..Default::default()
        };
        let doc = pipeline()
            .transform("https://example.com/", &fetched(html), &options)
            .unwrap();

        assert!(!doc.markdown.unwrap().contains("evil"));
    }

    #[test]
    fn test_links_are_absolute_ordered_unique() {
        let html = r#"<html><body>
            <a href="/a">A</a>
            <a href="/b">B</a>
            <a href="/a">A again</a>
            <a href="https://other.test/x">X</a>
        </body></html>"#;
        let doc = pipeline()
            .transform("https://example.com/", &fetched(html), &ScrapeOptions::default())
            .unwrap();

        assert_eq!(
            doc.links,
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://other.test/x",
            ]
        );
    }

    #[test]
    fn test_format_gating() {
        let html = "<html><body><p>x</p></body></html>";

        let minimal = pipeline()
            .transform("https://example.com/", &fetched(html), &ScrapeOptions::default())
            .unwrap();
        assert!(minimal.html.is_none());
        assert!(minimal.raw_html.is_none());

        let options = ScrapeOptions {
            formats: vec![Format::Markdown, Format::Html, Format::RawHtml],
            ..Default::default()
        };
        let full = pipeline()
            .transform("https://example.com/", &fetched(html), &options)
            .unwrap();
        assert!(full.html.is_some());
        assert_eq!(full.raw_html.as_deref(), Some(html));
    }

    #[test]
    fn test_byte_identical_across_runs() {
        let html = r#"<html lang="en"><head><title>T</title><meta name="description" content="d"></head>
            <body><article><h2>Head</h2><p>Body <b>bold</b></p><a href="/next">next</a></article></body></html>"#;
        let options = ScrapeOptions {
            only_main_content: true,
            remove_base64_images: true,
            ..Default::default()
        };

        let first = pipeline()
            .transform("https://example.com/", &fetched(html), &options)
            .unwrap();
        let second = pipeline()
            .transform("https://example.com/", &fetched(html), &options)
            .unwrap();

        assert_eq!(first.markdown, second.markdown);
        assert_eq!(first.text, second.text);
        assert_eq!(first.links, second.links);
    }

    #[tokio::test]
    async fn test_extract_failure_attaches_error() {
        let html = "<html><body><p>content</p></body></html>";
        let options = ScrapeOptions {
            formats: vec![Format::Markdown, Format::Extract],
            extract: Some(crate::options::ExtractOptions::default()),
            ..Default::default()
        };

        let doc = pipeline()
            .run("https://example.com/", &fetched(html), &options)
            .await
            .unwrap();

        assert!(doc.markdown.is_some());
        assert!(doc.extract.is_none());
        assert_eq!(
            doc.error.unwrap().kind,
            crate::document::ErrorKind::ExtractFailed
        );
    }
}
