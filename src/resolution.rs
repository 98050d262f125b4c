use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};

use crate::config::AppConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    CategoryScore, DateWindow, Resolution, ResolutionOutcome, ResolutionSummary, Signal,
    WeeklyAccuracy,
};
use crate::providers::SignalProvider;
use crate::stats::round_to;
use crate::store::ScoreStore;

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// ISO week label such as `2026-W08`.
pub fn iso_week_label(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Mean filings per week over the weeks that saw any filing at all.
pub fn historical_weekly_average(filings: &BTreeMap<NaiveDate, f64>) -> f64 {
    let mut weekly: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (day, count) in filings {
        *weekly.entry(week_start(*day)).or_default() += count;
    }
    let active: Vec<f64> = weekly.into_values().filter(|total| *total > 0.0).collect();
    if active.is_empty() {
        return 0.0;
    }
    active.iter().sum::<f64>() / active.len() as f64
}

pub fn resolve(predicted_high: bool, realized_high: bool) -> ResolutionOutcome {
    match (predicted_high, realized_high) {
        (true, false) => ResolutionOutcome::Overestimate,
        (false, true) => ResolutionOutcome::Underestimate,
        _ => ResolutionOutcome::Hit,
    }
}

/// Folds stored resolutions, oldest week first, into per-week and global accuracy.
pub fn summarize(resolutions: Vec<Resolution>) -> ResolutionSummary {
    let mut by_week: BTreeMap<NaiveDate, Vec<Resolution>> = BTreeMap::new();
    for resolution in resolutions {
        by_week.entry(resolution.week_start).or_default().push(resolution);
    }

    let mut hits_total = 0;
    let mut evaluated = 0;
    let mut weeks = Vec::with_capacity(by_week.len());
    for (week_start, mut detail) in by_week {
        detail.sort_by(|a, b| {
            b.average_score
                .total_cmp(&a.average_score)
                .then_with(|| a.category.cmp(&b.category))
        });
        let hits = detail.iter().filter(|r| r.hit).count();
        let total = detail.len();
        hits_total += hits;
        evaluated += total;
        weeks.push(WeeklyAccuracy {
            week: detail
                .first()
                .map(|r| r.week.clone())
                .unwrap_or_else(|| iso_week_label(week_start)),
            week_start,
            accuracy: percentage(hits, total),
            hits,
            total,
            detail,
        });
    }

    ResolutionSummary {
        global_accuracy: percentage(hits_total, evaluated),
        weeks,
    }
}

fn percentage(hits: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(hits as f64 / total as f64 * 100.0, 1)
}

pub struct ResolutionTracker {
    config: Arc<AppConfig>,
    provider: Arc<dyn SignalProvider>,
    store: Arc<dyn ScoreStore>,
}

impl ResolutionTracker {
    pub fn new(
        config: Arc<AppConfig>,
        provider: Arc<dyn SignalProvider>,
        store: Arc<dyn ScoreStore>,
    ) -> Self {
        Self {
            config,
            provider,
            store,
        }
    }

    /// Resolves every complete Monday..Sunday week that has stored scores.
    ///
    /// Returns the number of weeks resolved.
    pub async fn compute_weekly_resolutions(&self, as_of: NaiveDate) -> EngineResult<usize> {
        let lookback_days = self.config.resolution.lookback_weeks * 7;
        let window = DateWindow::new(as_of, lookback_days);
        let scores = self
            .store
            .scores_between(window.start(), as_of)
            .await
            .map_err(EngineError::Persistence)?;

        let weeks: BTreeSet<NaiveDate> = scores
            .iter()
            .map(|s| week_start(s.date))
            .filter(|monday| *monday + Duration::days(6) <= as_of)
            .collect();
        if weeks.is_empty() {
            tracing::info!("No complete scored weeks to resolve");
            return Ok(0);
        }

        for category in &self.config.categories {
            let filings = match self.provider.filing_daily_counts(category, window).await {
                Ok(filings) => filings,
                Err(error) => {
                    let error = EngineError::provider(Signal::Urgency, &category.id)(error);
                    tracing::warn!(
                        category = %category.id,
                        error = %error,
                        "Skipping category resolutions"
                    );
                    continue;
                }
            };
            let historical = historical_weekly_average(&filings);

            for monday in &weeks {
                let resolution =
                    self.resolve_week(&category.id, *monday, &scores, &filings, historical);
                self.store
                    .upsert_resolution(&resolution)
                    .await
                    .map_err(EngineError::Persistence)?;
            }
        }

        tracing::info!(weeks = weeks.len(), "Weekly resolutions computed");
        Ok(weeks.len())
    }

    fn resolve_week(
        &self,
        category: &str,
        monday: NaiveDate,
        scores: &[CategoryScore],
        filings: &BTreeMap<NaiveDate, f64>,
        historical: f64,
    ) -> Resolution {
        let sunday = monday + Duration::days(6);
        let in_week: Vec<f64> = scores
            .iter()
            .filter(|s| s.category == category && s.date >= monday && s.date <= sunday)
            .map(|s| s.score_total)
            .collect();
        let average_score = if in_week.is_empty() {
            0.0
        } else {
            in_week.iter().sum::<f64>() / in_week.len() as f64
        };
        let realized: f64 = filings.range(monday..=sunday).map(|(_, v)| v).sum();

        let predicted_high = average_score >= self.config.resolution.high_score;
        let realized_high = realized > historical;
        let outcome = resolve(predicted_high, realized_high);

        Resolution {
            week: iso_week_label(monday),
            week_start: monday,
            category: category.to_string(),
            average_score: round_to(average_score, 2),
            predicted_color: self.config.scoring.thresholds.classify(average_score),
            realized_filings: realized.round() as i64,
            historical_weekly_average: round_to(historical, 2),
            hit: outcome == ResolutionOutcome::Hit,
            outcome,
        }
    }

    pub async fn get_resolutions(&self, weeks: usize) -> EngineResult<ResolutionSummary> {
        let resolutions = self
            .store
            .recent_resolutions(weeks)
            .await
            .map_err(EngineError::Persistence)?;
        Ok(summarize(resolutions))
    }
}
