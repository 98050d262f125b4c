use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    Alert, AnalysisType, CategoryScore, CorrelationRecord, Observation, Resolution,
};
use crate::store::ScoreStore;

const OBSERVATION_SOURCES: [&str; 5] = ["media", "trends", "legislative", "speech", "filing"];

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Loads a synthetic six-week history for a few categories, ending at `as_of`.
///
/// Legislative activity trails media attention by five days so that the
/// correlation phase has a pattern to find.
pub async fn seed(pool: &PgPool, as_of: NaiveDate) -> anyhow::Result<usize> {
    let categories = ["security_justice", "energy", "health"];
    let mut observations = Vec::new();

    for (c, category) in categories.iter().enumerate() {
        let keyword = match *category {
            "security_justice" => "security",
            "energy" => "energy",
            _ => "health",
        };
        for day in 0..45i64 {
            let date = as_of - Duration::days(44 - day);
            let phase = (day + c as i64 * 3) % 9;
            let media = (2 + phase * (c as i64 + 1)) as f64;
            let lagged_phase = (day - 5 + c as i64 * 3).rem_euclid(9);
            let legislative = (1 + lagged_phase / 2) as f64;

            observations.push(seed_row("media", category, Some(keyword), date, media, 1.1));
            observations.push(seed_row("legislative", category, None, date, legislative, 1.0));
            observations.push(seed_row(
                "trends",
                category,
                None,
                date,
                (20 + phase * 7) as f64,
                1.0,
            ));
            if day % 3 == 0 {
                let filings = (1 + phase / 3) as f64;
                observations.push(seed_row("filing", category, None, date, filings, 1.0));
            }
            if day > 35 && phase > 5 {
                observations.push(seed_row("speech", category, None, date, 1.0, 0.8));
            }
        }
    }

    let mut inserted = 0usize;
    for observation in &observations {
        if insert_observation(pool, observation).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

fn seed_row(
    source: &str,
    category: &str,
    keyword: Option<&str>,
    observed_on: NaiveDate,
    value: f64,
    weight: f64,
) -> Observation {
    Observation {
        source: source.to_string(),
        category: Some(category.to_string()),
        keyword: keyword.map(str::to_string),
        observed_on,
        value,
        weight,
        source_key: Some(format!("seed-{source}-{category}-{observed_on}")),
    }
}

async fn insert_observation(pool: &PgPool, observation: &Observation) -> anyhow::Result<bool> {
    if !OBSERVATION_SOURCES.contains(&observation.source.as_str()) {
        bail!(
            "unknown observation source {:?}; expected one of {:?}",
            observation.source,
            OBSERVATION_SOURCES
        );
    }

    let source_key = observation
        .source_key
        .clone()
        .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

    let result = sqlx::query(
        r#"
        INSERT INTO legislative_pulse.signal_observations
        (id, source, category, keyword, observed_on, value, weight, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&observation.source)
    .bind(&observation.category)
    .bind(&observation.keyword)
    .bind(observation.observed_on)
    .bind(observation.value)
    .bind(observation.weight)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<Observation>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", line + 2))?;
        if insert_observation(pool, &row).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn score_from_row(row: &PgRow) -> anyhow::Result<CategoryScore> {
    let color: String = row.get("color");
    Ok(CategoryScore {
        category: row.get("category"),
        date: row.get("score_date"),
        score_total: row.get("score_total"),
        score_media: row.get("score_media"),
        score_trends: row.get("score_trends"),
        score_legislative: row.get("score_legislative"),
        score_speech: row.get("score_speech"),
        score_urgency: row.get("score_urgency"),
        color: color.parse()?,
        calendar_factor: row.get("calendar_factor"),
    })
}

fn alert_from_row(row: &PgRow) -> anyhow::Result<Alert> {
    let color: String = row.get("color");
    Ok(Alert {
        id: row.get("id"),
        category: row.get("category"),
        kind: row.get("kind"),
        score: row.get("score"),
        color: color.parse()?,
        message: row.get("message"),
        score_date: row.get("alert_date"),
        timestamp: row.get("raised_at"),
    })
}

fn correlation_from_row(row: &PgRow) -> anyhow::Result<CorrelationRecord> {
    let analysis_type: String = row.get("analysis_type");
    Ok(CorrelationRecord {
        category: row.get("category"),
        analysis_type: analysis_type.parse()?,
        optimal_lag: row.get("optimal_lag"),
        coefficient: row.get("coefficient"),
        p_value: row.get("p_value"),
        significant: row.get("significant"),
        detail: row.get("detail"),
        analysis_date: row.get("analysis_date"),
    })
}

fn resolution_from_row(row: &PgRow) -> anyhow::Result<Resolution> {
    let color: String = row.get("predicted_color");
    let outcome: String = row.get("outcome");
    Ok(Resolution {
        week: row.get("week"),
        week_start: row.get("week_start"),
        category: row.get("category"),
        average_score: row.get("average_score"),
        predicted_color: color.parse()?,
        realized_filings: row.get("realized_filings"),
        historical_weekly_average: row.get("historical_weekly_average"),
        hit: row.get("hit"),
        outcome: outcome.parse()?,
    })
}

#[async_trait]
impl ScoreStore for PgStore {
    async fn upsert_score(&self, score: &CategoryScore) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO legislative_pulse.category_scores
            (category, score_date, score_total, score_media, score_trends,
             score_legislative, score_speech, score_urgency, color, calendar_factor)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (category, score_date) DO UPDATE
            SET score_total = EXCLUDED.score_total,
                score_media = EXCLUDED.score_media,
                score_trends = EXCLUDED.score_trends,
                score_legislative = EXCLUDED.score_legislative,
                score_speech = EXCLUDED.score_speech,
                score_urgency = EXCLUDED.score_urgency,
                color = EXCLUDED.color,
                calendar_factor = EXCLUDED.calendar_factor,
                computed_at = now()
            "#,
        )
        .bind(&score.category)
        .bind(score.date)
        .bind(score.score_total)
        .bind(score.score_media)
        .bind(score.score_trends)
        .bind(score.score_legislative)
        .bind(score.score_speech)
        .bind(score.score_urgency)
        .bind(score.color.as_str())
        .bind(score.calendar_factor)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert score for {}", score.category))?;
        Ok(())
    }

    async fn append_alert(&self, alert: &Alert) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO legislative_pulse.alerts
            (id, category, kind, score, color, message, raised_at, alert_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (category, kind, alert_date) DO NOTHING
            "#,
        )
        .bind(alert.id)
        .bind(&alert.category)
        .bind(&alert.kind)
        .bind(alert.score)
        .bind(alert.color.as_str())
        .bind(&alert.message)
        .bind(alert.timestamp)
        .bind(alert.score_date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_scores(&self) -> anyhow::Result<Vec<CategoryScore>> {
        let rows = sqlx::query(
            r#"
            SELECT s.*
            FROM legislative_pulse.category_scores s
            JOIN (
                SELECT category, MAX(score_date) AS max_date
                FROM legislative_pulse.category_scores
                GROUP BY category
            ) latest ON latest.category = s.category AND latest.max_date = s.score_date
            ORDER BY s.score_total DESC, s.category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(score_from_row).collect()
    }

    async fn score_history(
        &self,
        category: &str,
        since: NaiveDate,
    ) -> anyhow::Result<Vec<CategoryScore>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM legislative_pulse.category_scores
            WHERE category = $1 AND score_date >= $2
            ORDER BY score_date
            "#,
        )
        .bind(category)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(score_from_row).collect()
    }

    async fn scores_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<CategoryScore>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM legislative_pulse.category_scores
            WHERE score_date BETWEEN $1 AND $2
            ORDER BY score_date, category
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(score_from_row).collect()
    }

    async fn recent_alerts(&self, limit: usize) -> anyhow::Result<Vec<Alert>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM legislative_pulse.alerts
            ORDER BY alert_date DESC, raised_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn upsert_correlation(&self, record: &CorrelationRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO legislative_pulse.correlations
            (category, analysis_type, optimal_lag, coefficient, p_value,
             significant, detail, analysis_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (category, analysis_type, analysis_date) DO UPDATE
            SET optimal_lag = EXCLUDED.optimal_lag,
                coefficient = EXCLUDED.coefficient,
                p_value = EXCLUDED.p_value,
                significant = EXCLUDED.significant,
                detail = EXCLUDED.detail
            "#,
        )
        .bind(&record.category)
        .bind(record.analysis_type.as_str())
        .bind(record.optimal_lag)
        .bind(record.coefficient)
        .bind(record.p_value)
        .bind(record.significant)
        .bind(&record.detail)
        .bind(record.analysis_date)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to store {} for {}",
                record.analysis_type, record.category
            )
        })?;
        Ok(())
    }

    async fn latest_correlation(
        &self,
        category: &str,
        analysis_type: AnalysisType,
    ) -> anyhow::Result<Option<CorrelationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM legislative_pulse.correlations
            WHERE category = $1 AND analysis_type = $2
            ORDER BY analysis_date DESC
            LIMIT 1
            "#,
        )
        .bind(category)
        .bind(analysis_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(correlation_from_row).transpose()
    }

    async fn upsert_resolution(&self, resolution: &Resolution) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO legislative_pulse.resolutions
            (week, category, week_start, average_score, predicted_color,
             realized_filings, historical_weekly_average, hit, outcome)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (week, category) DO UPDATE
            SET average_score = EXCLUDED.average_score,
                predicted_color = EXCLUDED.predicted_color,
                realized_filings = EXCLUDED.realized_filings,
                historical_weekly_average = EXCLUDED.historical_weekly_average,
                hit = EXCLUDED.hit,
                outcome = EXCLUDED.outcome,
                computed_at = now()
            "#,
        )
        .bind(&resolution.week)
        .bind(&resolution.category)
        .bind(resolution.week_start)
        .bind(resolution.average_score)
        .bind(resolution.predicted_color.as_str())
        .bind(resolution.realized_filings)
        .bind(resolution.historical_weekly_average)
        .bind(resolution.hit)
        .bind(resolution.outcome.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_resolutions(&self, weeks: usize) -> anyhow::Result<Vec<Resolution>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM legislative_pulse.resolutions
            WHERE week IN (
                SELECT DISTINCT week FROM legislative_pulse.resolutions
                ORDER BY week DESC
                LIMIT $1
            )
            ORDER BY week, average_score DESC
            "#,
        )
        .bind(weeks as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(resolution_from_row).collect()
    }
}
