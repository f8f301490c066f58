use std::fs::write;
use std::path::PathBuf;

use syndicator::load_config::load_config;
use syndicator_core::config::CancellationPolicy;
use syndicator_core::request::RotationStrategy;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

const FULL: &str = r#"
orchestrator:
  max_concurrency: 8
  cancellation_policy: abandon_in_flight
state_dir: ./tmp/state
generator:
  endpoint: https://llm.internal/generate
domains:
  - id: blog-a
    publish_endpoint: https://blog-a.example/api/posts
    platform: wordpress
  - id: blog-b
    publish_endpoint: https://blog-b.example/api/posts
    platform: ghost
campaign:
  campaign_id: spring-sale
  domain_ids: [blog-b]
  keyword: running shoes
  target_url: https://shop.example/shoes
  anchor_text: best running shoes
  rotation:
    strategy: keyword-based
    template_pool: [minimal, news]
  url_options:
    add_utm_parameters: true
"#;

#[test]
fn full_config_loads_into_typed_sections() {
    let file = config_file(FULL);
    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.orchestrator.max_concurrency, 8);
    assert_eq!(config.orchestrator.unit_timeout_ms, 120_000);
    assert_eq!(
        config.orchestrator.cancellation_policy,
        CancellationPolicy::AbandonInFlight
    );
    assert_eq!(config.state_dir, PathBuf::from("./tmp/state"));
    assert_eq!(config.generator.endpoint.as_str(), "https://llm.internal/generate");
    assert_eq!(config.domains.len(), 2);
    assert_eq!(config.domains[1].platform, "ghost");

    let campaign = config.campaign.expect("campaign section");
    assert_eq!(campaign.campaign_id, "spring-sale");
    assert_eq!(campaign.domain_ids, vec!["blog-b"]);
    assert_eq!(campaign.rotation.strategy, RotationStrategy::KeywordBased);
    assert_eq!(
        campaign.rotation.template_pool,
        Some(vec!["minimal".to_string(), "news".to_string()])
    );
    assert!(campaign.url_options.add_utm_parameters);
    assert!(campaign.formatting.optimize_for_seo);
}

#[test]
fn campaign_defaults_to_generated_id_and_all_domains() {
    let yaml = r#"
state_dir: ./state
generator:
  endpoint: http://localhost:9000/generate
domains:
  - id: one
    publish_endpoint: http://localhost:9001/posts
    platform: wordpress
  - id: two
    publish_endpoint: http://localhost:9002/posts
    platform: wordpress
campaign:
  keyword: tea
  target_url: https://tea.example
  anchor_text: loose leaf tea
"#;
    let file = config_file(yaml);
    let campaign = load_config(file.path()).unwrap().campaign.unwrap();

    assert!(uuid::Uuid::parse_str(&campaign.campaign_id).is_ok());
    assert_eq!(campaign.domain_ids, vec!["one", "two"]);
}

#[test]
fn campaign_section_is_optional() {
    let yaml = r#"
state_dir: ./state
generator:
  endpoint: http://localhost:9000/generate
"#;
    let file = config_file(yaml);
    let config = load_config(file.path()).unwrap();
    assert!(config.campaign.is_none());
    assert!(config.domains.is_empty());
    assert_eq!(config.orchestrator.max_concurrency, 4);
}

#[test]
fn duplicate_domain_ids_are_rejected() {
    let yaml = r#"
state_dir: ./state
generator:
  endpoint: http://localhost:9000/generate
domains:
  - id: one
    publish_endpoint: http://localhost:9001/posts
    platform: wordpress
  - id: one
    publish_endpoint: http://localhost:9002/posts
    platform: wordpress
"#;
    let file = config_file(yaml);
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("more than once"), "{err}");
}

#[test]
fn zero_concurrency_is_rejected() {
    let yaml = r#"
orchestrator:
  max_concurrency: 0
state_dir: ./state
generator:
  endpoint: http://localhost:9000/generate
"#;
    let file = config_file(yaml);
    let err = load_config(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("max_concurrency"), "{err:#}");
}

#[test]
fn malformed_yaml_and_missing_file_fail_with_context() {
    let file = config_file("state_dir: [unterminated");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));

    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
