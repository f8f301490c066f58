//! Template rotation: decides which template each domain gets, once, before
//! any unit runs.
//!
//! The resulting [`TemplateAssignments`] is frozen for the lifetime of the
//! campaign. Retries look templates up here instead of rolling again.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::catalog::TemplateInfo;
use crate::error::ConfigurationError;
use crate::request::RotationStrategy;

/// Read-only `domain_id -> template_id` map for one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateAssignments(BTreeMap<String, String>);

impl TemplateAssignments {
    pub fn get(&self, domain_id: &str) -> Option<&str> {
        self.0.get(domain_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(d, t)| (d.as_str(), t.as_str()))
    }

    /// How many domains were bound to each template.
    pub fn histogram(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for template in self.0.values() {
            *counts.entry(template.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<(String, String)> for TemplateAssignments {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Seeded template selector. The seed only matters for
/// [`RotationStrategy::Random`].
#[derive(Debug, Clone, Copy)]
pub struct RotationSelector {
    seed: u64,
}

impl RotationSelector {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Seeded from the campaign id so a campaign always rolls the same way.
    pub fn for_campaign(campaign_id: &str) -> Self {
        Self::with_seed(digest_u64(&[campaign_id.as_bytes()]))
    }

    pub fn assign(
        &self,
        domains: &[String],
        pool: &[String],
        strategy: RotationStrategy,
        keyword: &str,
    ) -> Result<TemplateAssignments, ConfigurationError> {
        if pool.is_empty() {
            return Err(ConfigurationError::EmptyTemplatePool);
        }
        let m = pool.len();
        let assignments: TemplateAssignments = match strategy {
            RotationStrategy::Sequential => domains
                .iter()
                .enumerate()
                .map(|(i, d)| (d.clone(), pool[i % m].clone()))
                .collect(),
            RotationStrategy::Random => {
                let mut cycle = ShuffledCycle::new(pool, self.seed);
                domains
                    .iter()
                    .map(|d| (d.clone(), cycle.draw().to_string()))
                    .collect()
            }
            RotationStrategy::KeywordBased => domains
                .iter()
                .map(|d| {
                    let idx = keyword_index(keyword, d, m);
                    (d.clone(), pool[idx].clone())
                })
                .collect(),
        };
        debug!(
            strategy = ?strategy,
            domains = domains.len(),
            pool_size = m,
            histogram = ?assignments.histogram(),
            "Templates assigned"
        );
        Ok(assignments)
    }
}

/// Reorders the pool so historically better templates come first. Ties keep
/// their original order; templates missing from the catalog sort last.
pub fn weight_by_performance(pool: &[String], catalog: &[TemplateInfo]) -> Vec<String> {
    let score = |id: &str| {
        catalog
            .iter()
            .find(|t| t.id == id)
            .map_or(f64::NEG_INFINITY, |t| t.performance_score)
    };
    let mut weighted = pool.to_vec();
    weighted.sort_by(|a, b| score(b).total_cmp(&score(a)));
    weighted
}

/// One seeded permutation of the pool, replayed in order. Every run of `M`
/// consecutive draws covers the whole pool, so no template is skipped more
/// than `M-1` draws in a row. Reshuffling between cycles cannot keep that
/// bound: a template drawn first in one cycle and last in the next would be
/// skipped `2M-2` times.
struct ShuffledCycle<'a> {
    pool: &'a [String],
    order: Vec<usize>,
    next: usize,
}

impl<'a> ShuffledCycle<'a> {
    /// `pool` must not be empty.
    fn new(pool: &'a [String], seed: u64) -> Self {
        let mut order: Vec<usize> = (0..pool.len()).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        Self {
            pool,
            order,
            next: 0,
        }
    }

    fn draw(&mut self) -> &'a str {
        let idx = self.order[self.next % self.order.len()];
        self.next += 1;
        let pool: &'a [String] = self.pool;
        &pool[idx]
    }
}

fn keyword_index(keyword: &str, domain_id: &str, m: usize) -> usize {
    (digest_u64(&[keyword.as_bytes(), &[0u8], domain_id.as_bytes()]) % m as u64) as usize
}

/// First eight bytes of the SHA-256 of the concatenated parts.
pub(crate) fn digest_u64(parts: &[&[u8]]) -> u64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
