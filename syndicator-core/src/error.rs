//! Error taxonomy for the orchestrator.
//!
//! Only [`ConfigurationError`] (and the [`OrchestratorError`] that wraps it) is
//! ever returned to a caller as a hard error. Everything that goes wrong inside a
//! single domain's pipeline is converted into a
//! [`PublicationOutcome::Failure`](crate::state::PublicationOutcome) instead.

use thiserror::Error;

/// Fatal problems with a request or configuration, detected before dispatch.
/// Nothing is attempted when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("request contains no domains")]
    EmptyDomainList,

    #[error("domain {0:?} appears more than once in the request")]
    DuplicateDomain(String),

    #[error("domain {0:?} is not eligible for this campaign")]
    IneligibleDomain(String),

    #[error("required field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("invalid target url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("template pool is empty")]
    EmptyTemplatePool,

    #[error("template {0:?} is not in the catalog")]
    UnknownTemplate(String),

    #[error("template {0:?} appears more than once in the pool")]
    DuplicateTemplate(String),

    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("unit timeout must be greater than zero")]
    InvalidTimeout,

    #[error("content generation is disabled but no content_prompt was supplied")]
    MissingContent,
}

/// Error reported by an external collaborator (generator, publish adapter,
/// registry, credential store, notifier).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// Timeouts, 5xx-equivalents, rate limits. Worth retrying.
    #[error("transient dependency failure: {0}")]
    Transient(String),

    /// Auth failures, structural rejections. Retrying will fail the same way.
    #[error("permanent dependency failure: {0}")]
    Permanent(String),
}

impl DependencyError {
    pub fn transient(msg: impl Into<String>) -> Self {
        DependencyError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        DependencyError::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DependencyError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("generated content contains no paragraphs")]
    EmptyContent,

    #[error("formatting failed: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlBuildError {
    #[error("target url {url:?} cannot be parsed: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("target url {0:?} cannot carry a path segment")]
    CannotBeABase(String),
}

/// Errors surfaced by [`CampaignOrchestrator`](crate::orchestrator::CampaignOrchestrator).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("domain registry unavailable: {0}")]
    Registry(DependencyError),

    #[error("no stored run for campaign {0:?}")]
    UnknownCampaign(String),

    #[error("campaign {0:?} already has a stored run; use retry instead")]
    CampaignExists(String),

    #[error("a run for campaign {0:?} is already in progress")]
    RunInProgress(String),

    #[error("run state store failed: {0}")]
    Store(String),
}
