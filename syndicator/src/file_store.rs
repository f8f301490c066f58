//! Run state persisted as one pretty-printed JSON file per campaign.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use syndicator_core::contract::RunStateStore;
use syndicator_core::error::DependencyError;
use syndicator_core::state::CampaignRunState;
use tracing::{debug, error, info};

/// Stores `<dir>/<campaign>.json`. Writes go to a temporary file that is
/// renamed over the old one, so a crash mid-write leaves the previous state.
#[derive(Debug, Clone)]
pub struct JsonFileRunStateStore {
    dir: PathBuf,
}

impl JsonFileRunStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `campaign_id`. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, campaign_id: &str) -> PathBuf {
        let name: String = campaign_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl RunStateStore for JsonFileRunStateStore {
    async fn load(&self, campaign_id: &str) -> Result<Option<CampaignRunState>, DependencyError> {
        let path = self.path_for(campaign_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stored run state");
                return Ok(None);
            }
            Err(e) => {
                error!(error = ?e, path = %path.display(), "Failed to read run state");
                return Err(DependencyError::transient(format!(
                    "reading {}: {e}",
                    path.display()
                )));
            }
        };
        let state: CampaignRunState = serde_json::from_slice(&raw).map_err(|e| {
            error!(error = ?e, path = %path.display(), "Stored run state is corrupt");
            DependencyError::permanent(format!("parsing {}: {e}", path.display()))
        })?;
        if state.campaign_id != campaign_id {
            return Err(DependencyError::permanent(format!(
                "{} holds campaign {:?}, expected {:?}",
                path.display(),
                state.campaign_id,
                campaign_id
            )));
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &CampaignRunState) -> Result<(), DependencyError> {
        let io_err = |what: &str, e: std::io::Error| {
            error!(error = ?e, dir = %self.dir.display(), "Failed to {what} run state");
            DependencyError::transient(format!("{what}: {e}"))
        };
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err("create directory for", e))?;

        let path = self.path_for(&state.campaign_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| DependencyError::permanent(format!("serializing run state: {e}")))?;
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| io_err("write", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err("replace", e))?;
        info!(
            campaign_id = %state.campaign_id,
            path = %path.display(),
            attempts = state.attempts,
            "Run state saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syndicator_core::request::PublishingRequest;
    use syndicator_core::rotation::TemplateAssignments;
    use tempfile::tempdir;

    fn state(campaign_id: &str) -> CampaignRunState {
        let request: PublishingRequest = serde_json::from_value(serde_json::json!({
            "campaign_id": campaign_id,
            "domain_ids": ["d1", "d2"],
            "keyword": "tea",
            "target_url": "https://example.com",
            "anchor_text": "tea"
        }))
        .unwrap();
        let assignments: TemplateAssignments = [("d1", "minimal"), ("d2", "news")]
            .into_iter()
            .map(|(d, t)| (d.to_string(), t.to_string()))
            .collect();
        CampaignRunState::new(request, assignments)
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileRunStateStore::new(dir.path());
        assert!(store.load("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_state_round_trips_and_creates_directory() {
        let dir = tempdir().unwrap();
        let store = JsonFileRunStateStore::new(dir.path().join("nested/state"));
        let saved = state("spring/sale 2026");
        store.save(&saved).await.unwrap();

        let path = store.path_for("spring/sale 2026");
        assert!(path.ends_with("spring_sale_2026.json"));
        assert!(path.exists());
        assert_eq!(store.load("spring/sale 2026").await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_permanent_error() {
        let dir = tempdir().unwrap();
        let store = JsonFileRunStateStore::new(dir.path());
        std::fs::write(store.path_for("c1"), b"{not json").unwrap();
        let err = store.load("c1").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
