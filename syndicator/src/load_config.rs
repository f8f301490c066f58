/// `load_config` module: reads the static YAML campaign file into typed CLI configuration.
///
/// This is the only place untrusted YAML is parsed. Secrets never live in the
/// file; they are read from the environment by the collaborators that need them
/// (see [`crate::credentials`] and [`crate::http`]).
///
/// # Accepted shape
/// ```yaml
/// orchestrator:            # optional, see syndicator_core::config::OrchestratorConfig
///   max_concurrency: 4
/// state_dir: ./state
/// generator:
///   endpoint: https://llm.internal/generate
/// domains:
///   - id: blog-a
///     publish_endpoint: https://blog-a.example/api/posts
///     platform: wordpress
/// campaign:                # optional; required by `run`
///   keyword: running shoes
///   target_url: https://shop.example
///   anchor_text: best running shoes
/// ```
///
/// A campaign without `campaign_id` gets a fresh UUID; one without `domain_ids`
/// targets every configured domain in file order.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_yaml::Value;
use syndicator_core::config::OrchestratorConfig;
use syndicator_core::request::PublishingRequest;
use tracing::{error, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub orchestrator: OrchestratorConfig,
    pub state_dir: PathBuf,
    pub generator: GeneratorSection,
    pub domains: Vec<DomainTarget>,
    pub campaign: Option<PublishingRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSection {
    pub endpoint: Url,
}

/// A publishing target and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DomainTarget {
    pub id: String,
    pub publish_endpoint: Url,
    /// Key into the credential store, e.g. `wordpress`.
    pub platform: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    state_dir: PathBuf,
    generator: GeneratorSection,
    #[serde(default)]
    domains: Vec<DomainTarget>,
    #[serde(default)]
    campaign: Option<Value>,
}

/// Loads and checks a config file. Errors carry the path and the reason.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let raw: RawConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    let mut seen = HashSet::new();
    for domain in &raw.domains {
        if !seen.insert(domain.id.as_str()) {
            bail!("domain {:?} is configured more than once", domain.id);
        }
    }

    let campaign = raw
        .campaign
        .map(|value| campaign_from_yaml(value, &raw.domains))
        .transpose()?;

    raw.orchestrator
        .validate()
        .context("invalid orchestrator section")?;

    Ok(CliConfig {
        orchestrator: raw.orchestrator,
        state_dir: raw.state_dir,
        generator: raw.generator,
        domains: raw.domains,
        campaign,
    })
}

fn campaign_from_yaml(mut value: Value, domains: &[DomainTarget]) -> Result<PublishingRequest> {
    let Some(map) = value.as_mapping_mut() else {
        bail!("`campaign` must be a mapping");
    };

    let id_key = Value::from("campaign_id");
    if map.get(&id_key).map_or(true, Value::is_null) {
        let generated = uuid::Uuid::new_v4().to_string();
        info!(campaign_id = %generated, "No campaign_id configured, generated one");
        map.insert(id_key, Value::from(generated));
    }

    let domains_key = Value::from("domain_ids");
    if map.get(&domains_key).map_or(true, Value::is_null) {
        let all: Vec<Value> = domains.iter().map(|d| Value::from(d.id.clone())).collect();
        map.insert(domains_key, Value::Sequence(all));
    }

    serde_yaml::from_value(value).context("Failed to parse `campaign` section")
}
