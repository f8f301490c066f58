//! The campaign request and its validation.
//!
//! [`validate`] is the only place a [`ConfigurationError`] is produced. It runs
//! before any template is assigned or any domain is touched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::catalog::TemplateInfo;
use crate::error::ConfigurationError;

/// One logical campaign spanning many domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishingRequest {
    pub campaign_id: String,
    pub domain_ids: Vec<String>,
    pub keyword: String,
    pub target_url: String,
    pub anchor_text: String,
    #[serde(default)]
    pub content_prompt: Option<String>,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub formatting: FormattingOptions,
    #[serde(default)]
    pub url_options: UrlOptions,
    #[serde(default)]
    pub publishing: PublishingOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
    #[default]
    Sequential,
    Random,
    KeywordBased,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default)]
    pub strategy: RotationStrategy,
    /// Subset of the catalog to rotate through. `None` means the full catalog.
    #[serde(default)]
    pub template_pool: Option<Vec<String>>,
    #[serde(default)]
    pub weight_by_performance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BacklinkPosition {
    #[default]
    Natural,
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingOptions {
    #[serde(default)]
    pub backlink_position: BacklinkPosition,
    #[serde(default)]
    pub include_table_of_contents: bool,
    #[serde(default = "default_true")]
    pub optimize_for_seo: bool,
    #[serde(default = "default_true")]
    pub generate_excerpt: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            backlink_position: BacklinkPosition::Natural,
            include_table_of_contents: false,
            optimize_for_seo: true,
            generate_excerpt: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UrlOptions {
    #[serde(default)]
    pub randomize_slug: bool,
    #[serde(default)]
    pub include_date: bool,
    #[serde(default)]
    pub add_utm_parameters: bool,
    #[serde(default)]
    pub tracking_enabled: bool,
    #[serde(default)]
    pub custom_slug: Option<String>,
    /// Overrides `utm_source`; defaults to the publishing domain id.
    #[serde(default)]
    pub utm_source: Option<String>,
    /// Overrides `utm_campaign`; defaults to the request's campaign id.
    #[serde(default)]
    pub campaign_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishingOptions {
    /// When false the `content_prompt` is published as-is instead of being sent
    /// to the generator.
    #[serde(default = "default_true")]
    pub generate_content: bool,
    #[serde(default)]
    pub notify_on_completion: bool,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub unit_timeout_ms: Option<u64>,
}

impl Default for PublishingOptions {
    fn default() -> Self {
        Self {
            generate_content: true,
            notify_on_completion: false,
            max_concurrency: None,
            unit_timeout_ms: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Checks every request invariant against the eligible domains and the
/// template catalog, and resolves the template pool the run will rotate over.
///
/// The returned pool keeps the order given in the request (or catalog order
/// when no explicit pool was supplied).
pub fn validate(
    request: &PublishingRequest,
    eligible_domains: &[String],
    catalog: &[TemplateInfo],
) -> Result<Vec<String>, ConfigurationError> {
    require_non_empty("campaign_id", &request.campaign_id)?;
    require_non_empty("keyword", &request.keyword)?;
    require_non_empty("target_url", &request.target_url)?;
    require_non_empty("anchor_text", &request.anchor_text)?;
    validate_target_url(&request.target_url)?;

    if request.domain_ids.is_empty() {
        return Err(ConfigurationError::EmptyDomainList);
    }
    let eligible: HashSet<&str> = eligible_domains.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    for domain in &request.domain_ids {
        if !seen.insert(domain.as_str()) {
            return Err(ConfigurationError::DuplicateDomain(domain.clone()));
        }
        if !eligible.contains(domain.as_str()) {
            warn!(domain = %domain, campaign_id = %request.campaign_id, "Domain not in registry");
            return Err(ConfigurationError::IneligibleDomain(domain.clone()));
        }
    }

    if !request.publishing.generate_content
        && request
            .content_prompt
            .as_deref()
            .map_or(true, |p| p.trim().is_empty())
    {
        return Err(ConfigurationError::MissingContent);
    }
    if request.publishing.max_concurrency == Some(0) {
        return Err(ConfigurationError::InvalidConcurrency);
    }
    if request.publishing.unit_timeout_ms == Some(0) {
        return Err(ConfigurationError::InvalidTimeout);
    }

    let pool = resolve_pool(&request.rotation, catalog)?;
    debug!(
        campaign_id = %request.campaign_id,
        domains = request.domain_ids.len(),
        pool = ?pool,
        "Request validated"
    );
    Ok(pool)
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::EmptyField(field));
    }
    Ok(())
}

fn validate_target_url(raw: &str) -> Result<(), ConfigurationError> {
    let parsed = Url::parse(raw).map_err(|e| ConfigurationError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        scheme => Err(ConfigurationError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme or missing host ({scheme})"),
        }),
    }
}

fn resolve_pool(
    rotation: &RotationConfig,
    catalog: &[TemplateInfo],
) -> Result<Vec<String>, ConfigurationError> {
    let pool: Vec<String> = match &rotation.template_pool {
        None => catalog.iter().map(|t| t.id.clone()).collect(),
        Some(pool) => {
            let known: HashSet<&str> = catalog.iter().map(|t| t.id.as_str()).collect();
            let mut seen = HashSet::new();
            for id in pool {
                if !known.contains(id.as_str()) {
                    return Err(ConfigurationError::UnknownTemplate(id.clone()));
                }
                if !seen.insert(id.as_str()) {
                    return Err(ConfigurationError::DuplicateTemplate(id.clone()));
                }
            }
            pool.clone()
        }
    };
    if pool.is_empty() {
        return Err(ConfigurationError::EmptyTemplatePool);
    }
    Ok(pool)
}
