//! Structured extraction
//!
//! The extractor is an external collaborator reached over HTTP: given the
//! document text and a schema, it returns a structured object. Extraction
//! failure is non-fatal; the document is delivered without an `extract`
//! field and the error is attached.

use crate::document::{ErrorKind, ErrorRecord};
use crate::options::ExtractOptions;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        options: &ExtractOptions,
    ) -> Result<serde_json::Value, ErrorRecord>;
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
}

/// Extractor client for the external extraction service
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExtractor {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(
        &self,
        text: &str,
        options: &ExtractOptions,
    ) -> Result<serde_json::Value, ErrorRecord> {
        let request = ExtractRequest {
            text,
            schema: options.schema.as_ref(),
            prompt: options.prompt.as_deref(),
            system_prompt: options.system_prompt.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/extract", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ErrorRecord::new(ErrorKind::ExtractFailed, format!("extractor unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ErrorRecord::new(
                ErrorKind::ExtractFailed,
                format!("extractor returned HTTP {}", response.status().as_u16()),
            ));
        }

        response.json().await.map_err(|e| {
            ErrorRecord::new(
                ErrorKind::ExtractFailed,
                format!("malformed extractor response: {e}"),
            )
        })
    }
}

/// Extractor used when no extraction service is configured
pub struct DisabledExtractor;

#[async_trait]
impl Extractor for DisabledExtractor {
    async fn extract(
        &self,
        _text: &str,
        _options: &ExtractOptions,
    ) -> Result<serde_json::Value, ErrorRecord> {
        Err(ErrorRecord::new(
            ErrorKind::ExtractFailed,
            "no extraction service configured",
        ))
    }
}
