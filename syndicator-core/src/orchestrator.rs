//! # orchestrator: the calling layer's entry point
//!
//! [`CampaignOrchestrator`] ties the pipeline together for one campaign at a time:
//!
//! 1. validate the request against the domain registry and template catalog
//! 2. assign a template to every domain (once, frozen for the campaign)
//! 3. fan the units out through a [`PublishDispatcher`]
//! 4. merge outcomes into a [`CampaignRunState`] and persist it
//! 5. optionally notify a [`CompletionNotifier`]
//!
//! [`retry_run`](CampaignOrchestrator::retry_run) reloads the stored state and
//! re-dispatches only what is outstanding. Only configuration and persistence
//! problems are returned as errors; per-domain failures live in the report.
//!
//! At most one run (initial or retry) may be active per campaign id inside one
//! orchestrator; a second one is rejected with
//! [`OrchestratorError::RunInProgress`]. Each active run owns its own
//! [`CancellationToken`], reachable through
//! [`cancel_run`](CampaignOrchestrator::cancel_run); cancelling one campaign
//! never touches another, nor any later run of the same campaign.
//!
//! The state is saved before anything is published and again after every
//! merged outcome, so a process that dies mid-run leaves only the units that
//! were in flight at that moment outstanding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::aggregate::RunSummary;
use crate::cancel::CancellationToken;
use crate::config::OrchestratorConfig;
use crate::contract::{CompletionNotifier, DomainRegistry, RunStateStore, TemplateCatalog};
use crate::dispatch::{ProgressEvent, PublishDispatcher};
use crate::error::OrchestratorError;
use crate::executor::{Collaborators, PublishUnitExecutor};
use crate::request::{self, PublishingRequest};
use crate::retry::{dispatch_outstanding, RetryCoordinator};
use crate::rotation::{weight_by_performance, RotationSelector};
use crate::state::CampaignRunState;

/// Summary plus the full state it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub summary: RunSummary,
    pub state: CampaignRunState,
}

impl RunReport {
    fn from_state(state: CampaignRunState) -> Self {
        Self {
            summary: state.summary(),
            state,
        }
    }
}

pub struct CampaignOrchestrator {
    collaborators: Collaborators,
    registry: Arc<dyn DomainRegistry>,
    catalog: Arc<dyn TemplateCatalog>,
    store: Arc<dyn RunStateStore>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    config: OrchestratorConfig,
    progress: Option<UnboundedSender<ProgressEvent>>,
    active: ActiveRuns,
}

type ActiveRuns = Mutex<HashMap<String, CancellationToken>>;

/// A claimed run slot and the token that cancels this run only. Releases the
/// slot on drop.
struct RunGuard<'a> {
    active: &'a ActiveRuns,
    campaign_id: String,
    cancel: CancellationToken,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        lock_active(self.active).remove(&self.campaign_id);
    }
}

fn lock_active(active: &ActiveRuns) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CampaignOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        registry: Arc<dyn DomainRegistry>,
        catalog: Arc<dyn TemplateCatalog>,
        store: Arc<dyn RunStateStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            collaborators,
            registry,
            catalog,
            store,
            notifier: None,
            config,
            progress: None,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_progress(mut self, progress: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Cooperatively cancels the active run of `campaign_id`. Units that have
    /// not started stay pending for a later retry. Returns false when no run
    /// of that campaign is active.
    pub fn cancel_run(&self, campaign_id: &str) -> bool {
        match lock_active(&self.active).get(campaign_id) {
            Some(token) => {
                warn!(campaign_id = %campaign_id, "[RUN] Cancelling active run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Campaign ids with a run in progress.
    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock_active(&self.active).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Validates, assigns, dispatches and persists a brand new campaign.
    pub async fn start_run(&self, request: PublishingRequest) -> Result<RunReport, OrchestratorError> {
        let campaign_id = request.campaign_id.clone();
        info!(campaign_id = %campaign_id, domains = request.domain_ids.len(), "[RUN] Starting campaign run");
        let guard = self.claim(&campaign_id)?;

        let effective = self.config.for_request(&request.publishing);
        effective.validate()?;

        let eligible = self
            .registry
            .eligible_domains(&campaign_id)
            .await
            .map_err(|e| {
                error!(campaign_id = %campaign_id, error = %e, "[RUN][ERROR] Domain registry failed");
                OrchestratorError::Registry(e)
            })?;
        let catalog = self.catalog.templates();
        let mut pool = request::validate(&request, &eligible, &catalog).map_err(|e| {
            error!(campaign_id = %campaign_id, error = %e, "[RUN][ERROR] Request rejected");
            e
        })?;
        if request.rotation.weight_by_performance {
            pool = weight_by_performance(&pool, &catalog);
        }

        if self.load(&campaign_id).await?.is_some() {
            warn!(campaign_id = %campaign_id, "[RUN] Campaign already has a stored run");
            return Err(OrchestratorError::CampaignExists(campaign_id));
        }

        let assignments = RotationSelector::for_campaign(&campaign_id).assign(
            &request.domain_ids,
            &pool,
            request.rotation.strategy,
            &request.keyword,
        )?;
        let state = CampaignRunState::new(request, assignments);
        // persist the assignment before anything is published
        self.save(&state).await?;

        let dispatcher = self.dispatcher(&effective);
        let state =
            dispatch_outstanding(&dispatcher, state, &guard.cancel, Some(self.store.as_ref())).await;
        self.finish(state).await
    }

    /// Re-dispatches the outstanding domains of a stored campaign.
    pub async fn retry_run(&self, campaign_id: &str) -> Result<RunReport, OrchestratorError> {
        info!(campaign_id = %campaign_id, "[RUN] Retrying campaign");
        let guard = self.claim(campaign_id)?;
        let state = self
            .load(campaign_id)
            .await?
            .ok_or_else(|| OrchestratorError::UnknownCampaign(campaign_id.to_string()))?;

        if state.is_terminal() {
            info!(campaign_id = %campaign_id, "[RUN] Campaign is terminal, nothing dispatched");
            return Ok(RunReport::from_state(state));
        }

        let effective = self.config.for_request(&state.request.publishing);
        effective.validate()?;
        let dispatcher = self.dispatcher(&effective);
        let state = RetryCoordinator::new(&dispatcher)
            .with_checkpoints(self.store.as_ref())
            .retry(state, &guard.cancel)
            .await;
        self.finish(state).await
    }

    /// Current summary and state of a stored campaign, without dispatching.
    pub async fn status(&self, campaign_id: &str) -> Result<RunReport, OrchestratorError> {
        let state = self
            .load(campaign_id)
            .await?
            .ok_or_else(|| OrchestratorError::UnknownCampaign(campaign_id.to_string()))?;
        Ok(RunReport::from_state(state))
    }

    fn claim(&self, campaign_id: &str) -> Result<RunGuard<'_>, OrchestratorError> {
        let mut active = lock_active(&self.active);
        if active.contains_key(campaign_id) {
            warn!(campaign_id = %campaign_id, "[RUN] Rejected concurrent run");
            return Err(OrchestratorError::RunInProgress(campaign_id.to_string()));
        }
        let cancel = CancellationToken::new();
        active.insert(campaign_id.to_string(), cancel.clone());
        Ok(RunGuard {
            active: &self.active,
            campaign_id: campaign_id.to_string(),
            cancel,
        })
    }

    fn dispatcher(&self, effective: &OrchestratorConfig) -> PublishDispatcher {
        let executor = PublishUnitExecutor::new(
            self.collaborators.clone(),
            effective.unit_timeout(),
            effective.cancellation_policy,
        );
        let dispatcher = PublishDispatcher::new(Arc::new(executor), effective.max_concurrency);
        match &self.progress {
            Some(tx) => dispatcher.with_progress(tx.clone()),
            None => dispatcher,
        }
    }

    async fn finish(&self, state: CampaignRunState) -> Result<RunReport, OrchestratorError> {
        self.save(&state).await?;
        let report = RunReport::from_state(state);
        let summary = &report.summary;
        info!(
            campaign_id = %report.state.campaign_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            retryable = summary.retryable_failures,
            pending = summary.pending,
            attempts = report.state.attempts,
            "[RUN] Campaign run finished"
        );

        if report.state.request.publishing.notify_on_completion {
            match &self.notifier {
                Some(notifier) => {
                    if let Err(e) = notifier.notify(&report.state.campaign_id, summary).await {
                        warn!(campaign_id = %report.state.campaign_id, error = %e, "Completion notification failed");
                    }
                }
                None => warn!(
                    campaign_id = %report.state.campaign_id,
                    "Notification requested but no notifier configured"
                ),
            }
        }
        Ok(report)
    }

    async fn load(&self, campaign_id: &str) -> Result<Option<CampaignRunState>, OrchestratorError> {
        self.store.load(campaign_id).await.map_err(|e| {
            error!(campaign_id = %campaign_id, error = %e, "[RUN][ERROR] Failed to load run state");
            OrchestratorError::Store(e.to_string())
        })
    }

    async fn save(&self, state: &CampaignRunState) -> Result<(), OrchestratorError> {
        self.store.save(state).await.map_err(|e| {
            error!(campaign_id = %state.campaign_id, error = %e, "[RUN][ERROR] Failed to save run state");
            OrchestratorError::Store(e.to_string())
        })
    }
}
