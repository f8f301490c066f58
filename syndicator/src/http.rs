#![doc = "JSON-over-HTTP collaborators: the content generator and per-domain publish adapter used by the CLI."]
//
//! # HTTP collaborators
//!
//! - [`HttpContentGenerator`] POSTs `{keyword, prompt, template_id}` to the
//!   configured generator endpoint and expects `{"content": "..."}` back.
//! - [`HttpPublishAdapter`] POSTs the formatted document to the domain's
//!   `publish_endpoint` with a bearer token from the [`CredentialStore`] and
//!   expects `{"url": "..."}` back.
//!
//! Failures are classified for the retry logic: timeouts, connection errors,
//! 5xx and 429 are transient; other 4xx and unreadable bodies are permanent.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use syndicator_core::contract::{ContentGenerator, CredentialStore, GenerationRequest, PublishAdapter};
use syndicator_core::error::DependencyError;
use syndicator_core::format::FormattedDocument;
use url::Url;

use crate::load_config::DomainTarget;

pub const GENERATOR_KEY_VAR: &str = "SYNDICATOR_GENERATOR_KEY";

/// Maps a non-success HTTP status onto the retry taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> DependencyError {
    let message = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        DependencyError::transient(message)
    } else {
        DependencyError::permanent(message)
    }
}

/// Maps a transport-level failure onto the retry taxonomy.
pub fn classify_transport(err: &reqwest::Error) -> DependencyError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        DependencyError::transient(err.to_string())
    } else {
        DependencyError::permanent(err.to_string())
    }
}

/// Sends a request and decodes a JSON body of type `T`.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, DependencyError> {
    let response = request.send().await.map_err(|e| {
        tracing::warn!(error = ?e, "HTTP request failed");
        classify_transport(&e)
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, "HTTP endpoint returned an error status");
        return Err(classify_status(status, &body));
    }
    response.json::<T>().await.map_err(|e| {
        tracing::error!(error = ?e, "Failed to decode HTTP response body");
        DependencyError::permanent(format!("malformed response body: {e}"))
    })
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    keyword: &'a str,
    prompt: Option<&'a str>,
    template_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    content: String,
}

pub struct HttpContentGenerator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpContentGenerator {
    pub fn new(endpoint: Url, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }

    /// Reads the optional API key from `SYNDICATOR_GENERATOR_KEY`.
    pub fn new_from_env(endpoint: Url) -> Self {
        let api_key = env::var(GENERATOR_KEY_VAR).ok();
        tracing::info!(
            endpoint = %endpoint,
            api_key_set = api_key.is_some(),
            "Initialized HttpContentGenerator from environment"
        );
        Self::new(endpoint, api_key)
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DependencyError> {
        tracing::debug!(
            keyword = %request.keyword,
            template = %request.template_id,
            "Requesting generated content"
        );
        let body = GenerateBody {
            keyword: &request.keyword,
            prompt: request.prompt.as_deref(),
            template_id: &request.template_id,
        };
        let mut call = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let response: GenerateResponse = send_json(call).await?;
        Ok(response.content)
    }
}

#[derive(Debug, Serialize)]
struct PublishBody<'a> {
    title: &'a str,
    slug: &'a str,
    html: &'a str,
    excerpt: &'a str,
    meta_description: &'a str,
    word_count: usize,
    reading_time_minutes: usize,
    final_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    url: String,
}

pub struct HttpPublishAdapter {
    client: Client,
    targets: HashMap<String, DomainTarget>,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpPublishAdapter {
    pub fn new(targets: Vec<DomainTarget>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client: Client::new(),
            targets: targets.into_iter().map(|t| (t.id.clone(), t)).collect(),
            credentials,
        }
    }
}

#[async_trait]
impl PublishAdapter for HttpPublishAdapter {
    async fn publish(
        &self,
        domain_id: &str,
        document: &FormattedDocument,
        final_url: &Url,
    ) -> Result<String, DependencyError> {
        let target = self.targets.get(domain_id).ok_or_else(|| {
            DependencyError::permanent(format!("no publish endpoint configured for {domain_id}"))
        })?;
        let credentials = self.credentials.get_credentials(&target.platform).await?;
        tracing::info!(
            domain = %domain_id,
            endpoint = %target.publish_endpoint,
            slug = %document.slug,
            "Publishing document"
        );
        let body = PublishBody {
            title: &document.title,
            slug: &document.slug,
            html: &document.html,
            excerpt: &document.excerpt,
            meta_description: &document.meta_description,
            word_count: document.word_count,
            reading_time_minutes: document.reading_time_minutes,
            final_url: final_url.as_str(),
        };
        let call = self
            .client
            .post(target.publish_endpoint.clone())
            .bearer_auth(&credentials.token)
            .json(&body);
        let response: PublishResponse = send_json(call).await?;
        Ok(response.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "bad token").is_transient());
        assert!(!classify_status(StatusCode::UNPROCESSABLE_ENTITY, "").is_transient());
    }

    #[test]
    fn long_bodies_are_truncated_in_messages() {
        let body = "x".repeat(1_000);
        let err = classify_status(StatusCode::BAD_REQUEST, &body);
        assert!(err.to_string().len() < 300);
    }
}
