use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::config::Category;
use crate::models::DateWindow;
use crate::stats::round_to;

#[async_trait]
pub trait SignalProvider: Send + Sync {
    async fn media_score(&self, category: &Category, window: DateWindow) -> anyhow::Result<f64>;

    async fn media_daily_counts(
        &self,
        keyword: &str,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>>;

    async fn trends_score(&self, category: &Category, window: DateWindow) -> anyhow::Result<f64>;

    async fn trends_daily_series(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>>;

    async fn legislative_score(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<f64>;

    /// Category-agnostic legislative activity per day.
    async fn legislative_daily_counts(
        &self,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>>;

    async fn speech_mention_score(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<f64>;

    async fn count_recent_filings(
        &self,
        category: &Category,
        days: u32,
        as_of: NaiveDate,
    ) -> anyhow::Result<i64>;

    async fn filing_daily_counts(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>>;
}

const MEDIA_SATURATION: f64 = 20.0;
/// Points contributed by one fresh, substantive speech mention.
const SPEECH_MENTION_POINTS: f64 = 35.0;
/// Days for a speech mention's weight to halve.
const SPEECH_HALF_LIFE_DAYS: f64 = 7.0;

pub fn media_pressure(weighted_mentions: f64) -> f64 {
    if weighted_mentions <= 0.0 {
        return 0.0;
    }
    round_to((weighted_mentions / MEDIA_SATURATION * 100.0).min(100.0), 2)
}

pub fn legislative_share(relevant: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let ratio = (relevant / (total * 0.1).max(1.0)).min(1.0);
    round_to(ratio * 100.0, 2).min(100.0)
}

/// `mentions` holds (days ago, substance weight) pairs.
pub fn speech_intensity(mentions: &[(i64, f64)]) -> f64 {
    let score: f64 = mentions
        .iter()
        .map(|(days_ago, substance)| {
            let decay = 2f64.powf(-((*days_ago).max(0) as f64) / SPEECH_HALF_LIFE_DAYS);
            SPEECH_MENTION_POINTS * decay * substance.clamp(0.0, 1.0)
        })
        .sum();
    round_to(score, 2).min(100.0)
}

/// Provider backed by the `signal_observations` table filled by `import`/`seed`.
pub struct PgSignalProvider {
    pool: PgPool,
}

impl PgSignalProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn sum(
        &self,
        source: &str,
        category: Option<&str>,
        window: DateWindow,
    ) -> anyhow::Result<f64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(value), 0)::float8 AS total
            FROM legislative_pulse.signal_observations
            WHERE source = $1
              AND ($2::text IS NULL OR category = $2)
              AND observed_on BETWEEN $3 AND $4
            "#,
        )
        .bind(source)
        .bind(category)
        .bind(window.start())
        .bind(window.end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    async fn daily(
        &self,
        sql: &str,
        key: &str,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        let rows = sqlx::query(sql)
            .bind(key)
            .bind(window.start())
            .bind(window.end)
            .fetch_all(&self.pool)
            .await?;

        let mut series = BTreeMap::new();
        for row in rows {
            series.insert(row.get("day"), row.get("value"));
        }
        Ok(series)
    }
}

#[async_trait]
impl SignalProvider for PgSignalProvider {
    async fn media_score(&self, category: &Category, window: DateWindow) -> anyhow::Result<f64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(value * weight), 0)::float8 AS weighted
            FROM legislative_pulse.signal_observations
            WHERE source = 'media' AND category = $1
              AND observed_on BETWEEN $2 AND $3
            "#,
        )
        .bind(&category.id)
        .bind(window.start())
        .bind(window.end)
        .fetch_one(&self.pool)
        .await?;
        Ok(media_pressure(row.get("weighted")))
    }

    async fn media_daily_counts(
        &self,
        keyword: &str,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        self.daily(
            r#"
            SELECT observed_on AS day, SUM(value)::float8 AS value
            FROM legislative_pulse.signal_observations
            WHERE source = 'media' AND keyword = $1
              AND observed_on BETWEEN $2 AND $3
            GROUP BY observed_on
            ORDER BY observed_on
            "#,
            keyword,
            window,
        )
        .await
    }

    async fn trends_score(&self, category: &Category, window: DateWindow) -> anyhow::Result<f64> {
        let row = sqlx::query(
            r#"
            SELECT AVG(value)::float8 AS average
            FROM legislative_pulse.signal_observations
            WHERE source = 'trends' AND category = $1
              AND observed_on BETWEEN $2 AND $3
            "#,
        )
        .bind(&category.id)
        .bind(window.start())
        .bind(window.end)
        .fetch_one(&self.pool)
        .await?;
        let average: Option<f64> = row.get("average");
        Ok(average.map(|v| round_to(v, 2)).unwrap_or(0.0))
    }

    async fn trends_daily_series(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        self.daily(
            r#"
            SELECT observed_on AS day, AVG(value)::float8 AS value
            FROM legislative_pulse.signal_observations
            WHERE source = 'trends' AND category = $1
              AND observed_on BETWEEN $2 AND $3
            GROUP BY observed_on
            ORDER BY observed_on
            "#,
            &category.id,
            window,
        )
        .await
    }

    async fn legislative_score(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<f64> {
        let total = self.sum("legislative", None, window).await?;
        let relevant = self.sum("legislative", Some(&category.id), window).await?;
        Ok(legislative_share(relevant, total))
    }

    async fn legislative_daily_counts(
        &self,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        self.daily(
            r#"
            SELECT observed_on AS day, SUM(value)::float8 AS value
            FROM legislative_pulse.signal_observations
            WHERE source = $1
              AND observed_on BETWEEN $2 AND $3
            GROUP BY observed_on
            ORDER BY observed_on
            "#,
            "legislative",
            window,
        )
        .await
    }

    async fn speech_mention_score(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<f64> {
        let rows = sqlx::query(
            r#"
            SELECT observed_on, weight
            FROM legislative_pulse.signal_observations
            WHERE source = 'speech' AND category = $1
              AND observed_on BETWEEN $2 AND $3
            "#,
        )
        .bind(&category.id)
        .bind(window.start())
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        let mentions: Vec<(i64, f64)> = rows
            .iter()
            .map(|row| {
                let observed_on: NaiveDate = row.get("observed_on");
                ((window.end - observed_on).num_days(), row.get("weight"))
            })
            .collect();
        Ok(speech_intensity(&mentions))
    }

    async fn count_recent_filings(
        &self,
        category: &Category,
        days: u32,
        as_of: NaiveDate,
    ) -> anyhow::Result<i64> {
        let total = self
            .sum("filing", Some(&category.id), DateWindow::new(as_of, days))
            .await?;
        Ok(total.round() as i64)
    }

    async fn filing_daily_counts(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        self.daily(
            r#"
            SELECT observed_on AS day, SUM(value)::float8 AS value
            FROM legislative_pulse.signal_observations
            WHERE source = 'filing' AND category = $1
              AND observed_on BETWEEN $2 AND $3
            GROUP BY observed_on
            ORDER BY observed_on
            "#,
            &category.id,
            window,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_pressure_saturates_at_twenty_weighted_mentions() {
        assert_eq!(media_pressure(0.0), 0.0);
        assert_eq!(media_pressure(10.0), 50.0);
        assert_eq!(media_pressure(35.0), 100.0);
    }

    #[test]
    fn legislative_share_uses_ten_percent_floor() {
        assert_eq!(legislative_share(3.0, 0.0), 0.0);
        // 5 relevant of 20 total: 5 / max(2, 1) capped at 1.0
        assert_eq!(legislative_share(5.0, 20.0), 100.0);
        // 1 relevant of 50 total: 1 / 5
        assert_eq!(legislative_share(1.0, 50.0), 20.0);
        // small totals fall back to a denominator of one
        assert_eq!(legislative_share(0.5, 4.0), 50.0);
    }

    #[test]
    fn speech_intensity_decays_with_age() {
        assert_eq!(speech_intensity(&[]), 0.0);
        assert_eq!(speech_intensity(&[(0, 1.0)]), 35.0);
        assert_eq!(speech_intensity(&[(7, 1.0)]), 17.5);
        assert_eq!(speech_intensity(&[(0, 0.5)]), 17.5);
        let many: Vec<(i64, f64)> = (0..5).map(|_| (0, 1.0)).collect();
        assert_eq!(speech_intensity(&many), 100.0);
    }
}
