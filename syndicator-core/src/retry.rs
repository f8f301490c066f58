//! Re-dispatch of the outstanding subset of a campaign.
//!
//! Outstanding means retryable failures plus domains that never started. Each
//! goes out again with the template it was bound to on the first run; the
//! rotation is never re-rolled. Domains that already succeeded are not touched,
//! so calling [`RetryCoordinator::retry`] repeatedly never republishes them.

use std::pin::pin;

use futures::StreamExt;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::contract::RunStateStore;
use crate::dispatch::{PublishDispatcher, PublishUnit, UnitResult};
use crate::state::CampaignRunState;

pub struct RetryCoordinator<'a> {
    dispatcher: &'a PublishDispatcher,
    checkpoint: Option<&'a dyn RunStateStore>,
}

impl<'a> RetryCoordinator<'a> {
    pub fn new(dispatcher: &'a PublishDispatcher) -> Self {
        Self {
            dispatcher,
            checkpoint: None,
        }
    }

    /// Saves the state after every merged outcome, not only at the end.
    pub fn with_checkpoints(mut self, store: &'a dyn RunStateStore) -> Self {
        self.checkpoint = Some(store);
        self
    }

    /// Dispatches the retry candidates of `state` and merges their outcomes.
    /// With no candidates the state comes back unchanged.
    pub async fn retry(
        &self,
        state: CampaignRunState,
        cancel: &CancellationToken,
    ) -> CampaignRunState {
        if state.retry_candidates().is_empty() {
            info!(
                campaign_id = %state.campaign_id,
                "[RETRY] Nothing to retry, campaign is terminal"
            );
            return state;
        }
        info!(
            campaign_id = %state.campaign_id,
            attempt = state.attempts + 1,
            "[RETRY] Retrying outstanding domains"
        );
        dispatch_outstanding(self.dispatcher, state, cancel, self.checkpoint).await
    }
}

/// Runs every retry candidate of `state` through the dispatcher and merges
/// each outcome as it completes. Shared by the initial run, where every domain
/// is still pending, and by retries.
///
/// `attempts` only counts dispatches in which at least one unit ran. A failed
/// checkpoint is logged and the dispatch carries on; the caller's final save
/// reports persistent store trouble.
pub(crate) async fn dispatch_outstanding(
    dispatcher: &PublishDispatcher,
    mut state: CampaignRunState,
    cancel: &CancellationToken,
    checkpoint: Option<&dyn RunStateStore>,
) -> CampaignRunState {
    let units: Vec<PublishUnit> = state
        .retry_candidates()
        .into_iter()
        .filter_map(|domain| match state.assignments.get(&domain) {
            Some(template) => {
                let template = template.to_string();
                Some(PublishUnit::new(domain, template))
            }
            None => {
                warn!(
                    campaign_id = %state.campaign_id,
                    domain = %domain,
                    "Domain has no template assignment, leaving it untouched"
                );
                None
            }
        })
        .collect();

    let request = state.request.clone();
    let mut results = pin!(dispatcher.stream(&request, units, cancel));
    let mut ran = 0usize;
    let mut skipped = 0usize;
    while let Some(result) = results.next().await {
        match result {
            UnitResult::Finished(outcome) => {
                if ran == 0 {
                    state.attempts += 1;
                }
                ran += 1;
                state.merge(outcome);
                if let Some(store) = checkpoint {
                    if let Err(e) = store.save(&state).await {
                        warn!(
                            campaign_id = %state.campaign_id,
                            error = %e,
                            "Checkpoint save failed"
                        );
                    }
                }
            }
            UnitResult::NotStarted(domain) => {
                skipped += 1;
                // never-started domains stay (or become) outstanding
                if !state.failures.contains_key(&domain) {
                    state.pending.insert(domain);
                }
            }
        }
    }
    info!(
        campaign_id = %state.campaign_id,
        finished = ran,
        not_started = skipped,
        "[DISPATCH] Fan-out complete"
    );
    state
}
