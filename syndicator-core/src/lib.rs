#![doc = "syndicator-core: campaign publishing orchestration across many domains."]

//! This crate holds the pipeline itself: request validation, template rotation,
//! formatting, tracked link building, bounded fan-out, aggregation and retry.
//! Network clients, persistence backends and the CLI live in the `syndicator`
//! crate and plug in through the traits in [`contract`].
//!
//! # Usage
//! Build a [`orchestrator::CampaignOrchestrator`] from an
//! [`executor::Collaborators`] bundle plus a registry, catalog and store, then
//! call `start_run` / `retry_run` / `status`.

pub mod aggregate;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod format;
pub mod orchestrator;
pub mod request;
pub mod retry;
pub mod rotation;
pub mod state;
pub mod store;
pub mod tracked_url;
