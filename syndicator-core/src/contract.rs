//! # contract: seams to everything the orchestrator does not own
//!
//! Every external collaborator is a trait here so the pipeline can be driven by
//! real clients (see the `syndicator` CLI crate) or by `mockall` mocks in tests.
//!
//! - Async traits ([`ContentGenerator`], [`PublishAdapter`], [`DomainRegistry`],
//!   [`RunStateStore`], [`CredentialStore`], [`CompletionNotifier`]) are the only
//!   places a publishing unit may suspend.
//! - Sync traits ([`Formatter`], [`UrlBuilder`], [`TemplateCatalog`]) are pure
//!   computation; the defaults live in [`crate::format`], [`crate::tracked_url`]
//!   and [`crate::catalog`].
//!
//! All collaborator failures are reported as [`DependencyError`] so the
//! executor can decide retryability from the variant alone.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::aggregate::RunSummary;
use crate::catalog::TemplateInfo;
use crate::error::{DependencyError, FormatError, UrlBuildError};
use crate::format::{FormatInput, FormattedDocument};
use crate::request::FormattingOptions;
use crate::state::CampaignRunState;
use crate::tracked_url::UrlRequest;

/// Everything the content generator needs for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub keyword: String,
    pub prompt: Option<String>,
    pub template_id: String,
}

/// Opaque text generation (an LLM call in production).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce raw markdown-ish text for the keyword, shaped for the template.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, DependencyError>;
}

/// Pushes a formatted document into one domain's CMS.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PublishAdapter: Send + Sync {
    /// Publish and return the URL of the live post.
    async fn publish(
        &self,
        domain_id: &str,
        document: &FormattedDocument,
        final_url: &Url,
    ) -> Result<String, DependencyError>;
}

/// Source of blog-enabled, verified domains. Consulted once per request.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DomainRegistry: Send + Sync {
    async fn eligible_domains(&self, campaign_id: &str) -> Result<Vec<String>, DependencyError>;
}

/// Full set of templates available for rotation.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait TemplateCatalog: Send + Sync {
    fn templates(&self) -> Vec<TemplateInfo>;
}

/// Turns generated text into a publishable document.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Formatter: Send + Sync {
    fn format(
        &self,
        input: &FormatInput,
        options: &FormattingOptions,
    ) -> Result<FormattedDocument, FormatError>;
}

/// Derives the final tracked outbound link.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait UrlBuilder: Send + Sync {
    fn build(&self, request: &UrlRequest) -> Result<Url, UrlBuildError>;
}

/// Persistence for [`CampaignRunState`] between a run and its retries.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RunStateStore: Send + Sync {
    async fn load(&self, campaign_id: &str) -> Result<Option<CampaignRunState>, DependencyError>;

    async fn save(&self, state: &CampaignRunState) -> Result<(), DependencyError>;
}

/// Secrets for a publishing platform. Never serialized.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub token: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credentials(&self, platform_id: &str) -> Result<Credentials, DependencyError>;
}

/// Receives the summary of a finished run when the request asks for it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, campaign_id: &str, summary: &RunSummary) -> Result<(), DependencyError>;
}

/// Registry over a fixed list of domains, e.g. from a config file.
#[derive(Debug, Clone, Default)]
pub struct StaticDomainRegistry {
    domains: Vec<String>,
}

impl StaticDomainRegistry {
    pub fn new(domains: Vec<String>) -> Self {
        Self { domains }
    }
}

#[async_trait]
impl DomainRegistry for StaticDomainRegistry {
    async fn eligible_domains(&self, _campaign_id: &str) -> Result<Vec<String>, DependencyError> {
        Ok(self.domains.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_token() {
        let creds = Credentials {
            token: "s3cret".into(),
            username: Some("bot".into()),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("bot"));
    }

    #[tokio::test]
    async fn static_registry_returns_configured_domains() {
        let registry = StaticDomainRegistry::new(vec!["a".into(), "b".into()]);
        let domains = registry.eligible_domains("any").await.unwrap();
        assert_eq!(domains, vec!["a".to_string(), "b".to_string()]);
    }
}
