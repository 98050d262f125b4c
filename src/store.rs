use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{Alert, AnalysisType, CategoryScore, CorrelationRecord, Resolution};

/// Persistence seam shared by the scoring, correlation and resolution phases.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn upsert_score(&self, score: &CategoryScore) -> anyhow::Result<()>;

    /// Returns `false` when an alert with the same (category, kind, score date) already exists.
    async fn append_alert(&self, alert: &Alert) -> anyhow::Result<bool>;

    /// Most recent score per category, highest total first.
    async fn latest_scores(&self) -> anyhow::Result<Vec<CategoryScore>>;

    async fn score_history(
        &self,
        category: &str,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<CategoryScore>>;

    async fn scores_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<CategoryScore>>;

    async fn recent_alerts(&self, limit: usize) -> anyhow::Result<Vec<Alert>>;

    async fn upsert_correlation(&self, record: &CorrelationRecord) -> anyhow::Result<()>;

    async fn latest_correlation(
        &self,
        category: &str,
        analysis_type: AnalysisType,
    ) -> anyhow::Result<Option<CorrelationRecord>>;

    async fn upsert_resolution(&self, resolution: &Resolution) -> anyhow::Result<()>;

    /// Resolutions of the most recent `weeks` ISO weeks, oldest week first.
    async fn recent_resolutions(&self, weeks: usize) -> anyhow::Result<Vec<Resolution>>;
}
