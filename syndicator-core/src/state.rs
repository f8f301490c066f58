//! Per-domain outcomes and the campaign run state that accumulates them.
//!
//! [`CampaignRunState`] is the unit handed to a [`RunStateStore`](crate::contract::RunStateStore)
//! between an initial run and its retries. It only ever grows by merging
//! outcomes; a recorded success is never removed or overwritten.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::{summarize, RunSummary};
use crate::request::PublishingRequest;
use crate::rotation::TemplateAssignments;

/// Pipeline stage a unit failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ContentGeneration,
    Formatting,
    UrlBuilding,
    Publish,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ContentGeneration => "content-generation",
            Stage::Formatting => "formatting",
            Stage::UrlBuilding => "url-building",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSuccess {
    pub domain_id: String,
    pub published_url: String,
    /// The tracked outbound link embedded in the post.
    pub final_url: String,
    pub template_id: String,
    pub word_count: usize,
    pub seo_score: u8,
    pub processing_time_ms: u64,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishFailure {
    pub domain_id: String,
    pub stage: Stage,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublicationOutcome {
    Success(PublishSuccess),
    Failure(PublishFailure),
}

impl PublicationOutcome {
    pub fn domain_id(&self) -> &str {
        match self {
            PublicationOutcome::Success(s) => &s.domain_id,
            PublicationOutcome::Failure(f) => &f.domain_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PublicationOutcome::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRunState {
    pub campaign_id: String,
    pub request: PublishingRequest,
    pub assignments: TemplateAssignments,
    #[serde(default)]
    pub successes: BTreeMap<String, PublishSuccess>,
    #[serde(default)]
    pub failures: BTreeMap<String, PublishFailure>,
    /// Domains that have not been attempted yet, e.g. because the run was
    /// cancelled before they started.
    #[serde(default)]
    pub pending: BTreeSet<String>,
    /// Dispatches performed so far (initial run plus retries).
    #[serde(default)]
    pub attempts: u32,
}

impl CampaignRunState {
    pub fn new(request: PublishingRequest, assignments: TemplateAssignments) -> Self {
        let pending = request.domain_ids.iter().cloned().collect();
        Self {
            campaign_id: request.campaign_id.clone(),
            request,
            assignments,
            successes: BTreeMap::new(),
            failures: BTreeMap::new(),
            pending,
            attempts: 0,
        }
    }

    /// Records one outcome. Successes are final: a later outcome for a domain
    /// that already succeeded is dropped.
    pub fn merge(&mut self, outcome: PublicationOutcome) {
        let domain = outcome.domain_id().to_string();
        if self.successes.contains_key(&domain) {
            warn!(
                campaign_id = %self.campaign_id,
                domain = %domain,
                "Ignoring outcome for domain that already succeeded"
            );
            return;
        }
        self.pending.remove(&domain);
        match outcome {
            PublicationOutcome::Success(success) => {
                self.failures.remove(&domain);
                self.successes.insert(domain, success);
            }
            PublicationOutcome::Failure(failure) => {
                debug!(
                    campaign_id = %self.campaign_id,
                    domain = %domain,
                    stage = %failure.stage,
                    retryable = failure.retryable,
                    "Recording failure"
                );
                self.failures.insert(domain, failure);
            }
        }
    }

    pub fn merge_all(&mut self, outcomes: impl IntoIterator<Item = PublicationOutcome>) {
        for outcome in outcomes {
            self.merge(outcome);
        }
    }

    /// Domains a retry should dispatch, in request order: everything still
    /// pending plus retryable failures.
    pub fn retry_candidates(&self) -> Vec<String> {
        self.request
            .domain_ids
            .iter()
            .filter(|d| {
                self.pending.contains(*d)
                    || self.failures.get(*d).is_some_and(|f| f.retryable)
            })
            .cloned()
            .collect()
    }

    /// True once every domain either succeeded or failed for good.
    pub fn is_terminal(&self) -> bool {
        self.retry_candidates().is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        summarize(
            self.request.domain_ids.len(),
            self.successes.values(),
            self.failures.values(),
            self.pending.len(),
        )
    }
}
