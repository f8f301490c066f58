//! Reduces per-domain outcomes into a run summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::{PublicationOutcome, PublishFailure, PublishSuccess};

/// Derived statistics for a run. Never stored; always recomputed from the
/// outcome partitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_domains: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retryable_failures: usize,
    pub pending: usize,
    pub templates_used: BTreeMap<String, usize>,
    pub average_processing_time_ms: f64,
    pub total_word_count: u64,
    pub average_seo_score: f64,
}

impl RunSummary {
    pub fn is_complete_success(&self) -> bool {
        self.total_domains > 0 && self.succeeded == self.total_domains
    }

    pub fn is_partial_failure(&self) -> bool {
        self.succeeded > 0 && self.succeeded < self.total_domains
    }
}

/// Outcomes split by domain, plus their summary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedRun {
    pub summary: RunSummary,
    pub successes: BTreeMap<String, PublishSuccess>,
    pub failures: BTreeMap<String, PublishFailure>,
}

/// Partitions a flat list of outcomes. Outcome order does not matter; they are
/// keyed by domain id.
pub fn aggregate(outcomes: impl IntoIterator<Item = PublicationOutcome>) -> AggregatedRun {
    let mut successes = BTreeMap::new();
    let mut failures = BTreeMap::new();
    for outcome in outcomes {
        match outcome {
            PublicationOutcome::Success(s) => {
                successes.insert(s.domain_id.clone(), s);
            }
            PublicationOutcome::Failure(f) => {
                failures.insert(f.domain_id.clone(), f);
            }
        }
    }
    let summary = summarize(
        successes.len() + failures.len(),
        successes.values(),
        failures.values(),
        0,
    );
    AggregatedRun {
        summary,
        successes,
        failures,
    }
}

/// Averages are taken over successes only and are 0 when there are none.
pub fn summarize<'a>(
    total_domains: usize,
    successes: impl IntoIterator<Item = &'a PublishSuccess>,
    failures: impl IntoIterator<Item = &'a PublishFailure>,
    pending: usize,
) -> RunSummary {
    let mut summary = RunSummary {
        total_domains,
        pending,
        ..RunSummary::default()
    };
    let mut time_total: u128 = 0;
    let mut seo_total: u64 = 0;
    for s in successes {
        summary.succeeded += 1;
        *summary.templates_used.entry(s.template_id.clone()).or_insert(0) += 1;
        summary.total_word_count += s.word_count as u64;
        time_total += u128::from(s.processing_time_ms);
        seo_total += u64::from(s.seo_score);
    }
    for f in failures {
        summary.failed += 1;
        if f.retryable {
            summary.retryable_failures += 1;
        }
    }
    if summary.succeeded > 0 {
        let n = summary.succeeded as f64;
        summary.average_processing_time_ms = time_total as f64 / n;
        summary.average_seo_score = seo_total as f64 / n;
    }
    summary
}
