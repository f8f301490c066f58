//! Builds the final outbound link carried by each published document.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, Utc};
use url::Url;

use crate::contract::UrlBuilder;
use crate::error::UrlBuildError;
use crate::format::slugify;
use crate::request::UrlOptions;
use crate::rotation::digest_u64;

const SLUG_TOKEN_LEN: usize = 8;
const CLICK_ID_LEN: usize = 12;

/// Inputs for one domain's link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRequest {
    pub target_url: String,
    pub campaign_id: String,
    pub domain_id: String,
    pub options: UrlOptions,
}

/// Default [`UrlBuilder`].
///
/// Slug tokens come from a per-builder counter run through SHA-256, so they are
/// unique for as long as one builder lives (one orchestrator). They are not
/// meant to be unguessable.
#[derive(Debug, Default)]
pub struct TrackedUrlBuilder {
    counter: AtomicU64,
    date: Option<NaiveDate>,
}

impl TrackedUrlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the date used by `include_date` instead of today's UTC date.
    pub fn with_date(date: NaiveDate) -> Self {
        Self {
            counter: AtomicU64::new(0),
            date: Some(date),
        }
    }

    fn today(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn slug_token(&self, campaign_id: &str, domain_id: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = digest_u64(&[
            campaign_id.as_bytes(),
            &[0u8],
            domain_id.as_bytes(),
            &[0u8],
            &n.to_be_bytes(),
        ]);
        format!("{hash:016x}")[..SLUG_TOKEN_LEN].to_string()
    }
}

impl UrlBuilder for TrackedUrlBuilder {
    fn build(&self, request: &UrlRequest) -> Result<Url, UrlBuildError> {
        let mut url = Url::parse(&request.target_url).map_err(|e| UrlBuildError::InvalidTarget {
            url: request.target_url.clone(),
            reason: e.to_string(),
        })?;
        let opts = &request.options;

        let mut parts: Vec<String> = Vec::new();
        if opts.include_date {
            parts.push(self.today().format("%Y-%m-%d").to_string());
        }
        if let Some(custom) = opts.custom_slug.as_deref().map(slugify) {
            if !custom.is_empty() {
                parts.push(custom);
            }
        }
        if opts.randomize_slug {
            parts.push(self.slug_token(&request.campaign_id, &request.domain_id));
        }
        if !parts.is_empty() {
            url.path_segments_mut()
                .map_err(|_| UrlBuildError::CannotBeABase(request.target_url.clone()))?
                .pop_if_empty()
                .push(&parts.join("-"));
        }

        let mut added: Vec<(String, String)> = Vec::new();
        if opts.add_utm_parameters {
            let source = opts
                .utm_source
                .clone()
                .unwrap_or_else(|| request.domain_id.clone());
            let campaign = opts
                .campaign_id
                .clone()
                .unwrap_or_else(|| request.campaign_id.clone());
            added.push(("utm_source".into(), source));
            added.push(("utm_campaign".into(), campaign));
        }
        if opts.tracking_enabled {
            let hash = digest_u64(&[request.campaign_id.as_bytes(), &[0u8], request.domain_id.as_bytes()]);
            added.push(("click_id".into(), format!("{hash:016x}")[..CLICK_ID_LEN].to_string()));
        }

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(k, _)| !added.iter().any(|(a, _)| a == k))
            .collect();
        pairs.extend(added);
        pairs.sort();

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
        Ok(url)
    }
}
