use async_trait::async_trait;
use syndicator_core::aggregate::RunSummary;
use syndicator_core::contract::CompletionNotifier;
use syndicator_core::error::DependencyError;

/// Reports finished runs through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl CompletionNotifier for LogNotifier {
    async fn notify(&self, campaign_id: &str, summary: &RunSummary) -> Result<(), DependencyError> {
        tracing::info!(
            campaign_id = %campaign_id,
            total = summary.total_domains,
            succeeded = summary.succeeded,
            failed = summary.failed,
            retryable = summary.retryable_failures,
            pending = summary.pending,
            complete = summary.is_complete_success(),
            templates_used = ?summary.templates_used,
            "[NOTIFY] Campaign run completed"
        );
        Ok(())
    }
}
