//! Bounded fan-out of publishing units across domains.
//!
//! Outcomes arrive in completion order, not input order; callers key them by
//! domain id. Every unit yields an outcome unless cancellation stopped it from
//! starting, in which case its domain is listed in [`DispatchReport::not_started`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::executor::PublishUnitExecutor;
use crate::request::PublishingRequest;
use crate::state::PublicationOutcome;

/// One domain bound to its template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishUnit {
    pub domain_id: String,
    pub template_id: String,
}

impl PublishUnit {
    pub fn new(domain_id: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            domain_id: domain_id.into(),
            template_id: template_id.into(),
        }
    }
}

/// Per-unit completion events for progress reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    UnitStarted {
        campaign_id: String,
        domain_id: String,
        template_id: String,
    },
    UnitFinished {
        campaign_id: String,
        domain_id: String,
        succeeded: bool,
        completed: usize,
        total: usize,
    },
    UnitSkipped {
        campaign_id: String,
        domain_id: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub outcomes: Vec<PublicationOutcome>,
    pub not_started: Vec<String>,
}

/// What became of one unit handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitResult {
    Finished(PublicationOutcome),
    NotStarted(String),
}

pub struct PublishDispatcher {
    executor: Arc<PublishUnitExecutor>,
    max_concurrency: usize,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl PublishDispatcher {
    /// `max_concurrency` is clamped to at least one worker.
    pub fn new(executor: Arc<PublishUnitExecutor>, max_concurrency: usize) -> Self {
        Self {
            executor,
            max_concurrency: max_concurrency.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // a dropped receiver just means nobody is watching
            let _ = tx.send(event);
        }
    }

    /// Results in completion order, at most `max_concurrency` units in flight.
    /// Units are only driven while the stream is polled.
    pub fn stream<'a>(
        &'a self,
        request: &'a PublishingRequest,
        units: Vec<PublishUnit>,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = UnitResult> + 'a {
        let total = units.len();
        info!(
            campaign_id = %request.campaign_id,
            units = total,
            max_concurrency = self.max_concurrency,
            "[DISPATCH] Fanning out publishing units"
        );
        let completed = Arc::new(AtomicUsize::new(0));
        let campaign_id = request.campaign_id.as_str();

        stream::iter(units)
            .map(move |unit| {
                let completed = completed.clone();
                async move {
                    if cancel.is_cancelled() {
                        debug!(domain = %unit.domain_id, "Cancelled before start, skipping unit");
                        self.emit(ProgressEvent::UnitSkipped {
                            campaign_id: campaign_id.to_string(),
                            domain_id: unit.domain_id.clone(),
                        });
                        return UnitResult::NotStarted(unit.domain_id);
                    }
                    self.emit(ProgressEvent::UnitStarted {
                        campaign_id: campaign_id.to_string(),
                        domain_id: unit.domain_id.clone(),
                        template_id: unit.template_id.clone(),
                    });
                    let outcome = self
                        .executor
                        .execute(request, &unit.domain_id, &unit.template_id, cancel)
                        .await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.emit(ProgressEvent::UnitFinished {
                        campaign_id: campaign_id.to_string(),
                        domain_id: unit.domain_id,
                        succeeded: outcome.is_success(),
                        completed: done,
                        total,
                    });
                    UnitResult::Finished(outcome)
                }
            })
            .buffer_unordered(self.max_concurrency)
    }

    /// Drives every unit to completion and collects the results.
    pub async fn run(
        &self,
        request: &PublishingRequest,
        units: Vec<PublishUnit>,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let results: Vec<UnitResult> = self.stream(request, units, cancel).collect().await;

        let mut report = DispatchReport::default();
        for result in results {
            match result {
                UnitResult::Finished(outcome) => report.outcomes.push(outcome),
                UnitResult::NotStarted(domain) => report.not_started.push(domain),
            }
        }
        info!(
            campaign_id = %request.campaign_id,
            finished = report.outcomes.len(),
            not_started = report.not_started.len(),
            "[DISPATCH] Fan-out complete"
        );
        report
    }
}
