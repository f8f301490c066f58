//! One domain's pipeline: generate → format → build url → publish.
//!
//! [`PublishUnitExecutor::execute`] never returns an error. Whatever goes wrong
//! inside a unit is folded into a [`PublicationOutcome::Failure`] tagged with the
//! stage that was running, so a single domain can never abort the batch.
//!
//! Only the generator and publish calls suspend. Both run under the unit's
//! deadline and, with [`CancellationPolicy::AbandonInFlight`], race against the
//! run's [`CancellationToken`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cancel::CancellationToken;
use crate::config::CancellationPolicy;
use crate::contract::{ContentGenerator, Formatter, GenerationRequest, PublishAdapter, UrlBuilder};
use crate::error::DependencyError;
use crate::format::FormatInput;
use crate::request::PublishingRequest;
use crate::state::{PublicationOutcome, PublishFailure, PublishSuccess, Stage};
use crate::tracked_url::UrlRequest;

/// Lifecycle of a single publishing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Pending,
    Generating,
    Formatting,
    BuildingUrl,
    Publishing,
    Succeeded,
    Failed(Stage),
}

impl UnitPhase {
    /// The stage a failure in this phase is attributed to.
    pub fn stage(self) -> Option<Stage> {
        match self {
            UnitPhase::Generating => Some(Stage::ContentGeneration),
            UnitPhase::Formatting => Some(Stage::Formatting),
            UnitPhase::BuildingUrl => Some(Stage::UrlBuilding),
            UnitPhase::Publishing => Some(Stage::Publish),
            UnitPhase::Failed(stage) => Some(stage),
            UnitPhase::Pending | UnitPhase::Succeeded => None,
        }
    }

    /// Successful transition out of this phase. Terminal phases stay put.
    pub fn next(self) -> UnitPhase {
        match self {
            UnitPhase::Pending => UnitPhase::Generating,
            UnitPhase::Generating => UnitPhase::Formatting,
            UnitPhase::Formatting => UnitPhase::BuildingUrl,
            UnitPhase::BuildingUrl => UnitPhase::Publishing,
            UnitPhase::Publishing => UnitPhase::Succeeded,
            terminal => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UnitPhase::Succeeded | UnitPhase::Failed(_))
    }
}

/// The four collaborators a unit calls, one per stage.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn ContentGenerator>,
    pub formatter: Arc<dyn Formatter>,
    pub url_builder: Arc<dyn UrlBuilder>,
    pub publisher: Arc<dyn PublishAdapter>,
}

/// Why an async stage did not produce a value.
#[derive(Debug)]
enum Interrupt {
    Dependency(DependencyError),
    TimedOut,
    Cancelled,
}

pub struct PublishUnitExecutor {
    collaborators: Collaborators,
    timeout: Duration,
    policy: CancellationPolicy,
}

impl PublishUnitExecutor {
    pub fn new(collaborators: Collaborators, timeout: Duration, policy: CancellationPolicy) -> Self {
        Self {
            collaborators,
            timeout,
            policy,
        }
    }

    /// Runs every stage for `domain_id` with its assigned template.
    pub async fn execute(
        &self,
        request: &PublishingRequest,
        domain_id: &str,
        template_id: &str,
        cancel: &CancellationToken,
    ) -> PublicationOutcome {
        let span = info_span!(
            "unit",
            campaign_id = %request.campaign_id,
            domain = %domain_id,
            template = %template_id
        );
        self.run_stages(request, domain_id, template_id, cancel)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        request: &PublishingRequest,
        domain_id: &str,
        template_id: &str,
        cancel: &CancellationToken,
    ) -> PublicationOutcome {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut phase = UnitPhase::Pending;
        info!("[UNIT] Starting publishing unit");

        phase = advance(phase);
        let raw_text = if request.publishing.generate_content {
            let generation = GenerationRequest {
                keyword: request.keyword.clone(),
                prompt: request.content_prompt.clone(),
                template_id: template_id.to_string(),
            };
            let call = self.collaborators.generator.generate(&generation);
            match self.guarded(call, deadline, cancel).await {
                Ok(text) => text,
                Err(interrupt) => return self.interrupted(domain_id, phase, interrupt),
            }
        } else {
            debug!("Content generation disabled, using supplied content verbatim");
            request.content_prompt.clone().unwrap_or_default()
        };

        phase = advance(phase);
        let input = FormatInput {
            raw_text,
            keyword: request.keyword.clone(),
            anchor_text: request.anchor_text.clone(),
            target_url: request.target_url.clone(),
            template_id: template_id.to_string(),
        };
        let mut document = match self.collaborators.formatter.format(&input, &request.formatting) {
            Ok(doc) => doc,
            Err(e) => return failure(domain_id, phase, e.to_string(), false),
        };

        phase = advance(phase);
        let url_request = UrlRequest {
            target_url: request.target_url.clone(),
            campaign_id: request.campaign_id.clone(),
            domain_id: domain_id.to_string(),
            options: request.url_options.clone(),
        };
        let final_url = match self.collaborators.url_builder.build(&url_request) {
            Ok(url) => url,
            Err(e) => return failure(domain_id, phase, e.to_string(), false),
        };
        document.retarget_backlink(final_url.as_str());

        phase = advance(phase);
        let call = self
            .collaborators
            .publisher
            .publish(domain_id, &document, &final_url);
        let published_url = match self.guarded(call, deadline, cancel).await {
            Ok(url) => url,
            Err(interrupt) => return self.interrupted(domain_id, phase, interrupt),
        };

        advance(phase);
        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            published_url = %published_url,
            word_count = document.word_count,
            seo_score = document.seo_score,
            processing_time_ms,
            "[UNIT] Published"
        );
        PublicationOutcome::Success(PublishSuccess {
            domain_id: domain_id.to_string(),
            published_url,
            final_url: final_url.to_string(),
            template_id: template_id.to_string(),
            word_count: document.word_count,
            seo_score: document.seo_score,
            processing_time_ms,
            published_at: Utc::now(),
        })
    }

    /// Awaits one external call under the unit deadline and, when abandoning
    /// in-flight work, the cancellation token.
    async fn guarded<T, F>(
        &self,
        call: F,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<T, Interrupt>
    where
        F: Future<Output = Result<T, DependencyError>>,
    {
        let timed = tokio::time::timeout_at(deadline, call);
        let result = match self.policy {
            CancellationPolicy::AbandonInFlight => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
                r = timed => r,
            },
            CancellationPolicy::FinishInFlight => timed.await,
        };
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Interrupt::Dependency(e)),
            Err(_elapsed) => Err(Interrupt::TimedOut),
        }
    }

    fn interrupted(&self, domain_id: &str, phase: UnitPhase, interrupt: Interrupt) -> PublicationOutcome {
        let (message, retryable) = match interrupt {
            Interrupt::Dependency(e) => {
                let retryable = e.is_transient();
                (e.to_string(), retryable)
            }
            Interrupt::TimedOut => (
                format!("timed out after {} ms", self.timeout.as_millis()),
                true,
            ),
            Interrupt::Cancelled => ("cancelled while in progress".to_string(), true),
        };
        failure(domain_id, phase, message, retryable)
    }
}

fn advance(phase: UnitPhase) -> UnitPhase {
    let next = phase.next();
    debug!(from = ?phase, to = ?next, "Unit phase transition");
    next
}

fn failure(domain_id: &str, phase: UnitPhase, message: String, retryable: bool) -> PublicationOutcome {
    let stage = phase.stage().unwrap_or(Stage::ContentGeneration);
    warn!(
        stage = %stage,
        retryable,
        error = %message,
        "[UNIT][ERROR] Publishing unit failed"
    );
    debug!(from = ?phase, to = ?UnitPhase::Failed(stage), "Unit phase transition");
    PublicationOutcome::Failure(PublishFailure {
        domain_id: domain_id.to_string(),
        stage,
        message,
        retryable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockContentGenerator, MockFormatter, MockPublishAdapter, MockUrlBuilder};
    use crate::error::{FormatError, UrlBuildError};
    use crate::format::ContentFormatter;
    use crate::request::{
        FormattingOptions, PublishingOptions, RotationConfig, UrlOptions,
    };
    use crate::tracked_url::TrackedUrlBuilder;
    use async_trait::async_trait;

    const ARTICLE: &str = "# Brewing coffee at home\n\n\
        Good coffee starts with fresh beans. Grind right before brewing.\n\n\
        ## Water\n\n\
        Use water just off the boil. Coffee extracts best around ninety degrees.";

    fn request() -> PublishingRequest {
        PublishingRequest {
            campaign_id: "c1".into(),
            domain_ids: vec!["d1".into()],
            keyword: "coffee".into(),
            target_url: "https://example.com".into(),
            anchor_text: "great coffee".into(),
            content_prompt: None,
            rotation: RotationConfig::default(),
            formatting: FormattingOptions::default(),
            url_options: UrlOptions {
                add_utm_parameters: true,
                ..UrlOptions::default()
            },
            publishing: PublishingOptions::default(),
        }
    }

    fn generator_ok() -> MockContentGenerator {
        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Ok(ARTICLE.to_string()));
        generator
    }

    fn publisher_ok() -> MockPublishAdapter {
        let mut publisher = MockPublishAdapter::new();
        publisher
            .expect_publish()
            .returning(|domain, _, _| Ok(format!("https://{domain}/posts/1")));
        publisher
    }

    fn executor(
        generator: impl ContentGenerator + 'static,
        formatter: impl Formatter + 'static,
        url_builder: impl UrlBuilder + 'static,
        publisher: impl PublishAdapter + 'static,
        policy: CancellationPolicy,
    ) -> PublishUnitExecutor {
        PublishUnitExecutor::new(
            Collaborators {
                generator: Arc::new(generator),
                formatter: Arc::new(formatter),
                url_builder: Arc::new(url_builder),
                publisher: Arc::new(publisher),
            },
            Duration::from_secs(5),
            policy,
        )
    }

    fn expect_failure(outcome: PublicationOutcome) -> PublishFailure {
        match outcome {
            PublicationOutcome::Failure(f) => f,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    struct SlowGenerator(Duration);

    #[async_trait]
    impl ContentGenerator for SlowGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, DependencyError> {
            tokio::time::sleep(self.0).await;
            Ok(ARTICLE.to_string())
        }
    }

    #[test]
    fn phases_advance_in_strict_order() {
        let mut phase = UnitPhase::Pending;
        let mut seen = vec![phase];
        while !phase.is_terminal() {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                UnitPhase::Pending,
                UnitPhase::Generating,
                UnitPhase::Formatting,
                UnitPhase::BuildingUrl,
                UnitPhase::Publishing,
                UnitPhase::Succeeded,
            ]
        );
        assert_eq!(UnitPhase::Failed(Stage::Publish).next(), UnitPhase::Failed(Stage::Publish));
    }

    #[tokio::test]
    async fn successful_unit_carries_document_stats_and_tracked_link() {
        let mut publisher = MockPublishAdapter::new();
        publisher
            .expect_publish()
            .withf(|domain, doc, url| {
                domain == "d1"
                    && url.as_str().contains("utm_source=d1")
                    && doc.backlink_href == url.as_str()
                    && doc.html.contains("utm_campaign=c1")
            })
            .times(1)
            .returning(|_, _, _| Ok("https://d1/posts/1".into()));
        let exec = executor(
            generator_ok(),
            ContentFormatter,
            TrackedUrlBuilder::new(),
            publisher,
            CancellationPolicy::FinishInFlight,
        );

        let before = Utc::now();
        let outcome = exec
            .execute(&request(), "d1", "t1", &CancellationToken::new())
            .await;
        match outcome {
            PublicationOutcome::Success(s) => {
                assert!(s.published_at >= before && s.published_at <= Utc::now());
                assert_eq!(s.domain_id, "d1");
                assert_eq!(s.template_id, "t1");
                assert_eq!(s.published_url, "https://d1/posts/1");
                assert!(s.word_count > 0);
                assert!(s.final_url.contains("utm_campaign=c1"));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_generation_failure_is_retryable_and_skips_publish() {
        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Err(DependencyError::transient("503")));
        let mut publisher = MockPublishAdapter::new();
        publisher.expect_publish().never();
        let exec = executor(
            generator,
            ContentFormatter,
            TrackedUrlBuilder::new(),
            publisher,
            CancellationPolicy::FinishInFlight,
        );

        let f = expect_failure(exec.execute(&request(), "d1", "t1", &CancellationToken::new()).await);
        assert_eq!(f.stage, Stage::ContentGeneration);
        assert!(f.retryable);
        assert!(f.message.contains("503"));
    }

    #[tokio::test]
    async fn permanent_publish_failure_is_not_retryable() {
        let mut publisher = MockPublishAdapter::new();
        publisher
            .expect_publish()
            .returning(|_, _, _| Err(DependencyError::permanent("401 unauthorized")));
        let exec = executor(
            generator_ok(),
            ContentFormatter,
            TrackedUrlBuilder::new(),
            publisher,
            CancellationPolicy::FinishInFlight,
        );

        let f = expect_failure(exec.execute(&request(), "d1", "t1", &CancellationToken::new()).await);
        assert_eq!(f.stage, Stage::Publish);
        assert!(!f.retryable);
    }

    #[tokio::test]
    async fn formatting_failure_is_never_retryable() {
        let mut formatter = MockFormatter::new();
        formatter
            .expect_format()
            .returning(|_, _| Err(FormatError::EmptyContent));
        let mut url_builder = MockUrlBuilder::new();
        url_builder.expect_build().never();
        let exec = executor(
            generator_ok(),
            formatter,
            url_builder,
            publisher_ok(),
            CancellationPolicy::FinishInFlight,
        );

        let f = expect_failure(exec.execute(&request(), "d1", "t1", &CancellationToken::new()).await);
        assert_eq!(f.stage, Stage::Formatting);
        assert!(!f.retryable);
    }

    #[tokio::test]
    async fn url_building_failure_is_never_retryable() {
        let mut url_builder = MockUrlBuilder::new();
        url_builder
            .expect_build()
            .returning(|r| Err(UrlBuildError::CannotBeABase(r.target_url.clone())));
        let mut publisher = MockPublishAdapter::new();
        publisher.expect_publish().never();
        let exec = executor(
            generator_ok(),
            ContentFormatter,
            url_builder,
            publisher,
            CancellationPolicy::FinishInFlight,
        );

        let f = expect_failure(exec.execute(&request(), "d1", "t1", &CancellationToken::new()).await);
        assert_eq!(f.stage, Stage::UrlBuilding);
        assert!(!f.retryable);
    }

    #[tokio::test]
    async fn disabled_generation_uses_prompt_verbatim() {
        let mut generator = MockContentGenerator::new();
        generator.expect_generate().never();
        let mut req = request();
        req.publishing.generate_content = false;
        req.content_prompt = Some(ARTICLE.to_string());
        let exec = executor(
            generator,
            ContentFormatter,
            TrackedUrlBuilder::new(),
            publisher_ok(),
            CancellationPolicy::FinishInFlight,
        );

        let outcome = exec.execute(&req, "d1", "t1", &CancellationToken::new()).await;
        assert!(outcome.is_success(), "{outcome:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generation_times_out_as_retryable() {
        let exec = PublishUnitExecutor::new(
            Collaborators {
                generator: Arc::new(SlowGenerator(Duration::from_secs(60))),
                formatter: Arc::new(ContentFormatter),
                url_builder: Arc::new(TrackedUrlBuilder::new()),
                publisher: Arc::new(publisher_ok()),
            },
            Duration::from_millis(100),
            CancellationPolicy::FinishInFlight,
        );

        let f = expect_failure(exec.execute(&request(), "d1", "t1", &CancellationToken::new()).await);
        assert_eq!(f.stage, Stage::ContentGeneration);
        assert!(f.retryable);
        assert!(f.message.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_policy_stops_unit_at_current_stage() {
        let exec = PublishUnitExecutor::new(
            Collaborators {
                generator: Arc::new(SlowGenerator(Duration::from_secs(60))),
                formatter: Arc::new(ContentFormatter),
                url_builder: Arc::new(TrackedUrlBuilder::new()),
                publisher: Arc::new(publisher_ok()),
            },
            Duration::from_secs(600),
            CancellationPolicy::AbandonInFlight,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let f = expect_failure(exec.execute(&request(), "d1", "t1", &cancel).await);
        assert_eq!(f.stage, Stage::ContentGeneration);
        assert!(f.retryable);
        assert!(f.message.contains("cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn finish_policy_lets_running_unit_complete() {
        let exec = PublishUnitExecutor::new(
            Collaborators {
                generator: Arc::new(SlowGenerator(Duration::from_secs(2))),
                formatter: Arc::new(ContentFormatter),
                url_builder: Arc::new(TrackedUrlBuilder::new()),
                publisher: Arc::new(publisher_ok()),
            },
            Duration::from_secs(600),
            CancellationPolicy::FinishInFlight,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = exec.execute(&request(), "d1", "t1", &cancel).await;
        assert!(outcome.is_success(), "{outcome:?}");
    }
}
