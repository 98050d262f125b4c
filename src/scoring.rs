use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::config::{AppConfig, Category, Thresholds, Weights};
use crate::error::{EngineError, EngineResult};
use crate::models::{Alert, CategoryScore, Color, DateWindow, Signal};
use crate::providers::SignalProvider;
use crate::stats::round_to;
use crate::store::ScoreStore;
use crate::urgency::UrgencyEstimator;

/// Raw sub-scores for one category, each nominally in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalScores {
    pub media: f64,
    pub trends: f64,
    pub legislative: f64,
    pub speech: f64,
    pub urgency: f64,
}

/// Weighted sum of the sub-scores, clamped to [0, 100] and rounded to cents.
pub fn composite_score(signals: &SignalScores, weights: &Weights) -> f64 {
    let total = weights.media * signals.media
        + weights.trends * signals.trends
        + weights.legislative * signals.legislative
        + weights.speech * signals.speech
        + weights.urgency * signals.urgency;
    round_to(total.clamp(0.0, 100.0), 2)
}

pub fn classify(score_total: f64, thresholds: &Thresholds) -> Color {
    thresholds.classify(score_total)
}

pub fn sort_by_score_desc(scores: &mut [CategoryScore]) {
    scores.sort_by(|a, b| {
        b.score_total
            .total_cmp(&a.score_total)
            .then_with(|| a.category.cmp(&b.category))
    });
}

pub struct ScoringEngine {
    config: Arc<AppConfig>,
    provider: Arc<dyn SignalProvider>,
    store: Arc<dyn ScoreStore>,
    urgency: UrgencyEstimator,
}

impl ScoringEngine {
    pub fn new(
        config: Arc<AppConfig>,
        provider: Arc<dyn SignalProvider>,
        store: Arc<dyn ScoreStore>,
    ) -> Self {
        let urgency = UrgencyEstimator::new(config.clone(), provider.clone(), store.clone());
        Self {
            config,
            provider,
            store,
            urgency,
        }
    }

    async fn gather_signals(
        &self,
        category: &Category,
        as_of: NaiveDate,
    ) -> EngineResult<SignalScores> {
        let windows = &self.config.windows;
        let id = category.id.as_str();

        let media = self
            .provider
            .media_score(category, DateWindow::new(as_of, windows.media_days))
            .await
            .map_err(EngineError::provider(Signal::Media, id))?;
        let trends = self
            .provider
            .trends_score(category, DateWindow::new(as_of, windows.trends_days))
            .await
            .map_err(EngineError::provider(Signal::Trends, id))?;
        let legislative = self
            .provider
            .legislative_score(category, DateWindow::new(as_of, windows.legislative_days))
            .await
            .map_err(EngineError::provider(Signal::Legislative, id))?;
        let speech = self
            .provider
            .speech_mention_score(category, DateWindow::new(as_of, windows.speech_days))
            .await
            .map_err(EngineError::provider(Signal::Speech, id))?;

        let urgency = self
            .urgency
            .estimate_urgency(category, media, trends, as_of)
            .await?
            .urgency;

        Ok(SignalScores {
            media,
            trends,
            legislative,
            speech,
            urgency,
        })
    }

    /// Scores one category, upserts the result and raises a high-score alert when green.
    pub async fn compute_category_score(
        &self,
        category: &Category,
        as_of: NaiveDate,
    ) -> EngineResult<CategoryScore> {
        let signals = self.gather_signals(category, as_of).await?;
        let score_total = composite_score(&signals, &self.config.scoring.weights);
        let color = classify(score_total, &self.config.scoring.thresholds);

        let score = CategoryScore {
            category: category.id.clone(),
            date: as_of,
            score_total,
            score_media: signals.media,
            score_trends: signals.trends,
            score_legislative: signals.legislative,
            score_speech: signals.speech,
            score_urgency: signals.urgency,
            color,
            calendar_factor: self.urgency.calendar_factor(as_of),
        };

        tracing::info!(
            category = %category.id,
            color = %color,
            total = score_total,
            media = signals.media,
            trends = signals.trends,
            legislative = signals.legislative,
            speech = signals.speech,
            urgency = signals.urgency,
            "Category scored"
        );

        self.store
            .upsert_score(&score)
            .await
            .map_err(EngineError::Persistence)?;

        if color == Color::Green {
            let alert = Alert {
                id: Uuid::new_v4(),
                category: category.id.clone(),
                kind: Alert::HIGH_SCORE.to_string(),
                score: score_total,
                color,
                message: format!(
                    "{} scored {:.1}: high likelihood of legislative activity",
                    category.name, score_total
                ),
                score_date: as_of,
                timestamp: Utc::now(),
            };
            let inserted = self
                .store
                .append_alert(&alert)
                .await
                .map_err(EngineError::Persistence)?;
            if inserted {
                tracing::info!(
                    category = %category.id,
                    score = score_total,
                    "High-score alert raised"
                );
            }
        }

        Ok(score)
    }

    /// Scores every registered category; failures are logged and skipped.
    ///
    /// The result is ordered by `score_total`, highest first.
    pub async fn compute_all_scores(&self, as_of: NaiveDate) -> Vec<CategoryScore> {
        let concurrency = self.config.batch.concurrency.max(1);
        let results: Vec<(String, EngineResult<CategoryScore>)> =
            stream::iter(self.config.categories.iter())
                .map(|category| async move {
                    (
                        category.id.clone(),
                        self.compute_category_score(category, as_of).await,
                    )
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut scores = Vec::with_capacity(results.len());
        for (category, result) in results {
            match result {
                Ok(score) => scores.push(score),
                Err(error) => {
                    tracing::warn!(
                        category = %category,
                        error = %error,
                        "Skipping category for this run"
                    );
                }
            }
        }

        sort_by_score_desc(&mut scores);

        let count = |c: Color| scores.iter().filter(|s| s.color == c).count();
        tracing::info!(
            green = count(Color::Green),
            yellow = count(Color::Yellow),
            red = count(Color::Red),
            skipped = self.config.categories.len() - scores.len(),
            "Scoring run complete"
        );

        scores
    }

    pub async fn get_latest_scores(&self) -> EngineResult<Vec<CategoryScore>> {
        let mut scores = self
            .store
            .latest_scores()
            .await
            .map_err(EngineError::Persistence)?;
        sort_by_score_desc(&mut scores);
        Ok(scores)
    }

    pub async fn get_score_history(
        &self,
        category: &str,
        days: i64,
        as_of: NaiveDate,
    ) -> EngineResult<Vec<CategoryScore>> {
        self.config.category(category)?;
        let since = as_of - Duration::days(days.max(1));
        self.store
            .score_history(category, since)
            .await
            .map_err(EngineError::Persistence)
    }

    pub async fn get_recent_alerts(&self, limit: usize) -> EngineResult<Vec<Alert>> {
        self.store
            .recent_alerts(limit)
            .await
            .map_err(EngineError::Persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisType, CorrelationRecord};
    use crate::store::memory::MemoryStore;
    use crate::testing::FixedProvider;
    use proptest::prelude::*;

    fn as_of() -> NaiveDate {
        // June sits in recess under the default calendar
        NaiveDate::from_ymd_opt(2026, 6, 10).unwrap()
    }

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.categories = vec![
            Category::new("energy", "Energy", &["energy"]),
            Category::new("health", "Health", &["health"]),
            Category::new("labor", "Labor", &["employment"]),
        ];
        config
    }

    #[test]
    fn reference_scenario_scores_yellow() {
        let weights = Weights {
            media: 0.25,
            trends: 0.15,
            legislative: 0.30,
            speech: 0.15,
            urgency: 0.15,
        };
        let signals = SignalScores {
            media: 80.0,
            trends: 60.0,
            legislative: 50.0,
            speech: 0.0,
            urgency: 30.0,
        };
        let total = composite_score(&signals, &weights);
        assert_eq!(total, 48.5);
        assert_eq!(classify(total, &Thresholds::default()), Color::Yellow);
    }

    #[test]
    fn out_of_range_components_are_clamped_in_total() {
        let signals = SignalScores {
            media: 150.0,
            trends: 150.0,
            legislative: 150.0,
            speech: 150.0,
            urgency: 150.0,
        };
        assert_eq!(composite_score(&signals, &Weights::default()), 100.0);
    }

    proptest! {
        #[test]
        fn composite_stays_in_range(
            raw in prop::collection::vec(0.01f64..1.0, 5),
            scores in prop::collection::vec(0.0f64..=100.0, 5),
        ) {
            let sum: f64 = raw.iter().sum();
            let weights = Weights {
                media: raw[0] / sum,
                trends: raw[1] / sum,
                legislative: raw[2] / sum,
                speech: raw[3] / sum,
                urgency: raw[4] / sum,
            };
            let signals = SignalScores {
                media: scores[0],
                trends: scores[1],
                legislative: scores[2],
                speech: scores[3],
                urgency: scores[4],
            };
            let total = composite_score(&signals, &weights);
            prop_assert!((0.0..=100.0).contains(&total));
            let expected = if total >= 70.0 {
                Color::Green
            } else if total >= 40.0 {
                Color::Yellow
            } else {
                Color::Red
            };
            prop_assert_eq!(classify(total, &Thresholds::default()), expected);
        }
    }

    #[tokio::test]
    async fn batch_is_sorted_and_persisted() {
        let provider = FixedProvider::default()
            .with_scores("energy", 90.0, 80.0, 90.0, 70.0)
            .with_scores("health", 10.0, 10.0, 10.0, 0.0)
            .with_scores("labor", 50.0, 40.0, 60.0, 20.0);
        let store = Arc::new(MemoryStore::default());
        let engine =
            ScoringEngine::new(Arc::new(small_config()), Arc::new(provider), store.clone());

        let scores = engine.compute_all_scores(as_of()).await;

        let order: Vec<&str> = scores.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(order, vec!["energy", "labor", "health"]);
        assert_eq!(store.all_scores().len(), 3);
        assert_eq!(scores[0].color, Color::Green);
        assert_eq!(scores[0].calendar_factor, 0.5);
        assert_eq!(store.all_alerts().len(), 1);
        assert_eq!(store.all_alerts()[0].kind, Alert::HIGH_SCORE);
    }

    #[tokio::test]
    async fn rerun_for_same_date_is_idempotent() {
        let provider = Arc::new(
            FixedProvider::default()
                .with_scores("energy", 95.0, 90.0, 90.0, 80.0)
                .with_scores("health", 30.0, 20.0, 40.0, 0.0)
                .with_scores("labor", 60.0, 50.0, 50.0, 10.0)
                .with_filings("energy", 10, 20),
        );
        let store = Arc::new(MemoryStore::default());
        let engine = ScoringEngine::new(Arc::new(small_config()), provider, store.clone());

        engine.compute_all_scores(as_of()).await;
        let first_scores = store.all_scores();
        let first_alerts = store.all_alerts();

        engine.compute_all_scores(as_of()).await;
        assert_eq!(store.all_scores(), first_scores);
        assert_eq!(store.all_alerts(), first_alerts);
        assert_eq!(store.all_scores().len(), 3);
    }

    #[tokio::test]
    async fn each_green_score_date_raises_its_own_alert() {
        let provider = FixedProvider::default().with_scores("energy", 100.0, 100.0, 100.0, 100.0);
        let store = Arc::new(MemoryStore::default());
        let engine =
            ScoringEngine::new(Arc::new(small_config()), Arc::new(provider), store.clone());
        let category = Category::new("energy", "Energy", &["energy"]);
        let next_day = as_of() + Duration::days(1);

        for date in [as_of(), next_day, as_of()] {
            let score = engine.compute_category_score(&category, date).await.unwrap();
            assert_eq!(score.color, Color::Green);
        }

        let alerts = engine.get_recent_alerts(10).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].score_date, next_day);
        assert_eq!(alerts[1].score_date, as_of());
    }

    #[tokio::test]
    async fn provider_failure_skips_category_and_keeps_last_score() {
        let config = Arc::new(small_config());
        let store = Arc::new(MemoryStore::default());

        let healthy = FixedProvider::default()
            .with_scores("energy", 40.0, 40.0, 40.0, 40.0)
            .with_scores("health", 60.0, 60.0, 60.0, 60.0);
        let engine = ScoringEngine::new(config.clone(), Arc::new(healthy), store.clone());
        let yesterday = as_of() - Duration::days(1);
        engine.compute_all_scores(yesterday).await;

        let broken = FixedProvider::default()
            .with_scores("energy", 40.0, 40.0, 40.0, 40.0)
            .failing_media("health");
        let engine = ScoringEngine::new(config, Arc::new(broken), store.clone());
        let scores = engine.compute_all_scores(as_of()).await;

        assert!(scores.iter().all(|s| s.category != "health"));
        let latest = engine.get_latest_scores().await.unwrap();
        let health = latest.iter().find(|s| s.category == "health").unwrap();
        assert_eq!(health.date, yesterday);
        assert!(health.score_total > 0.0);
    }

    #[tokio::test]
    async fn provider_failure_is_not_a_zero_signal() {
        let provider = FixedProvider::default().failing_media("energy");
        let engine = ScoringEngine::new(
            Arc::new(small_config()),
            Arc::new(provider),
            Arc::new(MemoryStore::default()),
        );
        let category = Category::new("energy", "Energy", &["energy"]);
        let result = engine.compute_category_score(&category, as_of()).await;
        assert!(matches!(
            result,
            Err(EngineError::ProviderFailure {
                signal: Signal::Media,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn injected_correlation_feeds_urgency() {
        let store = Arc::new(MemoryStore::default());
        store
            .upsert_correlation(&CorrelationRecord {
                category: "energy".to_string(),
                analysis_type: AnalysisType::XcorrMediaLegislative,
                optimal_lag: 4,
                coefficient: 0.8,
                p_value: 0.001,
                significant: true,
                detail: String::new(),
                analysis_date: as_of() - Duration::days(2),
            })
            .await
            .unwrap();
        let provider = FixedProvider::default().with_scores("energy", 0.0, 0.0, 0.0, 0.0);
        let engine = ScoringEngine::new(Arc::new(small_config()), Arc::new(provider), store);

        let category = Category::new("energy", "Energy", &["energy"]);
        let score = engine.compute_category_score(&category, as_of()).await.unwrap();
        // correlation component 100 * 0.40 = 40 urgency, weighted by 0.15
        assert_eq!(score.score_urgency, 40.0);
        assert_eq!(score.score_total, 6.0);
        assert_eq!(score.color, Color::Red);
    }

    #[tokio::test]
    async fn history_rejects_unknown_category() {
        let engine = ScoringEngine::new(
            Arc::new(small_config()),
            Arc::new(FixedProvider::default()),
            Arc::new(MemoryStore::default()),
        );
        let result = engine.get_score_history("fisheries", 30, as_of()).await;
        assert!(matches!(result, Err(EngineError::UnknownCategory(_))));
    }
}
