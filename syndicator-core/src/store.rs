use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::contract::RunStateStore;
use crate::error::DependencyError;
use crate::state::CampaignRunState;

/// Process-local [`RunStateStore`]. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryRunStateStore {
    states: Mutex<HashMap<String, CampaignRunState>>,
}

impl InMemoryRunStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CampaignRunState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RunStateStore for InMemoryRunStateStore {
    async fn load(&self, campaign_id: &str) -> Result<Option<CampaignRunState>, DependencyError> {
        Ok(self.lock().get(campaign_id).cloned())
    }

    async fn save(&self, state: &CampaignRunState) -> Result<(), DependencyError> {
        debug!(campaign_id = %state.campaign_id, attempts = state.attempts, "Storing run state");
        self.lock().insert(state.campaign_id.clone(), state.clone());
        Ok(())
    }
}
