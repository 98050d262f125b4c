use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::config::{AppConfig, Category, LagConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{AnalysisType, CorrelationRecord, DateWindow, Prediction, Signal};
use crate::providers::SignalProvider;
use crate::stats::{
    align_daily, f_survival, is_all_zero, ols_ssr, pearson, population_std, round_to,
    t_two_sided_p, z_scores, Outcome, STD_EPSILON,
};
use crate::store::ScoreStore;

/// Below this |r| a lag relationship is reported as weak.
const WEAK_CORRELATION: f64 = 0.2;
const MIN_PEAK_POINTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrangerLag {
    pub lag: usize,
    pub f_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrangerReport {
    pub max_lag: usize,
    pub observations: usize,
    /// Lags whose regressions were well-posed, ascending.
    pub lags: Vec<GrangerLag>,
}

impl GrangerReport {
    /// Lag with the lowest p-value; ties go to the shorter lag.
    pub fn best(&self) -> Option<&GrangerLag> {
        self.lags.iter().fold(None, |best: Option<&GrangerLag>, lag| match best {
            Some(current) if current.p_value <= lag.p_value => Some(current),
            _ => Some(lag),
        })
    }
}

/// Tests whether past values of `x` improve the prediction of `y` beyond
/// `y`'s own past, for every lag in `1..=max_lag`.
pub fn granger_test(
    x: &[f64],
    y: &[f64],
    max_lag: usize,
    config: &LagConfig,
) -> Outcome<GrangerReport> {
    if is_all_zero(x) || is_all_zero(y) {
        return Outcome::EmptySeries;
    }
    let n = x.len().min(y.len());
    let required = max_lag + config.min_observations;
    if max_lag == 0 || n < required {
        return Outcome::InsufficientData {
            required,
            available: n,
        };
    }

    let mut lags = Vec::with_capacity(max_lag);
    for lag in 1..=max_lag {
        let mut restricted = Vec::with_capacity(n - lag);
        let mut unrestricted = Vec::with_capacity(n - lag);
        let mut response = Vec::with_capacity(n - lag);
        for t in lag..n {
            let mut row = Vec::with_capacity(1 + 2 * lag);
            row.push(1.0);
            row.extend((1..=lag).map(|i| y[t - i]));
            restricted.push(row.clone());
            row.extend((1..=lag).map(|i| x[t - i]));
            unrestricted.push(row);
            response.push(y[t]);
        }

        let rows = response.len();
        let columns = 1 + 2 * lag;
        if rows <= columns {
            tracing::debug!(lag, rows, columns, "Granger lag skipped: no residual freedom");
            continue;
        }
        let df_resid = (rows - columns) as f64;

        let (Some(ssr_r), Some(ssr_u)) = (
            ols_ssr(&restricted, &response),
            ols_ssr(&unrestricted, &response),
        ) else {
            tracing::debug!(lag, "Granger lag skipped: singular design");
            continue;
        };
        if ssr_u <= 0.0 {
            tracing::debug!(lag, "Granger lag skipped: perfect unrestricted fit");
            continue;
        }

        let f_statistic = ((ssr_r - ssr_u) / lag as f64) / (ssr_u / df_resid);
        let Some(p_value) = f_survival(f_statistic, lag as f64, df_resid) else {
            tracing::debug!(lag, f_statistic, "Granger lag skipped: F statistic not finite");
            continue;
        };

        lags.push(GrangerLag {
            lag,
            f_statistic: round_to(f_statistic, 4),
            p_value: round_to(p_value, 6),
            significant: p_value < config.p_value_threshold,
        });
    }

    if lags.is_empty() {
        return Outcome::Degenerate(format!("all {max_lag} lags were degenerate"));
    }
    Outcome::Ok(GrangerReport {
        max_lag,
        observations: n,
        lags,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XcorrLag {
    /// Positive when `x` leads `y`.
    pub lag: i32,
    pub correlation: f64,
    pub p_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossCorrelation {
    pub lags: Vec<XcorrLag>,
    pub optimal_lag: i32,
    pub max_correlation: f64,
    pub optimal_p_value: f64,
    pub interpretation: String,
}

impl CrossCorrelation {
    /// Strongest |r| over the whole sweep, negative and zero lags included.
    pub fn peak(&self) -> Option<&XcorrLag> {
        self.lags.iter().fold(None, |best: Option<&XcorrLag>, lag| match best {
            Some(current) if current.correlation.abs() >= lag.correlation.abs() => Some(current),
            _ => Some(lag),
        })
    }
}

fn lagged_pair<'a>(x: &'a [f64], y: &'a [f64], lag: i32) -> (&'a [f64], &'a [f64]) {
    let n = x.len();
    let shift = lag.unsigned_abs() as usize;
    if lag >= 0 {
        (&x[..n - shift], &y[shift..])
    } else {
        (&x[shift..], &y[..n - shift])
    }
}

/// Sweeps Pearson correlation over `-max_lags..=max_lags` on z-scored inputs.
pub fn cross_correlation(
    x: &[f64],
    y: &[f64],
    max_lags: usize,
    config: &LagConfig,
) -> Outcome<CrossCorrelation> {
    if is_all_zero(x) || is_all_zero(y) {
        return Outcome::EmptySeries;
    }
    let n = x.len().min(y.len());
    if n < config.min_observations.max(3) {
        return Outcome::InsufficientData {
            required: config.min_observations.max(3),
            available: n,
        };
    }

    let zx = z_scores(&x[..n]);
    let zy = z_scores(&y[..n]);
    let max_lags = max_lags.min(n - 2) as i32;

    let mut lags = Vec::with_capacity(2 * max_lags as usize + 1);
    for lag in -max_lags..=max_lags {
        let (a, b) = lagged_pair(&zx, &zy, lag);
        let overlap = a.len();
        let (correlation, p_value) = match pearson(a, b) {
            Some(r) if overlap > 2 => {
                let df = (overlap - 2) as f64;
                let t = r * df.sqrt() / (1.0 - r * r + STD_EPSILON).sqrt();
                (r, t_two_sided_p(t, df).unwrap_or(1.0))
            }
            _ => (0.0, 1.0),
        };
        lags.push(XcorrLag {
            lag,
            correlation: round_to(correlation, 4),
            p_value: round_to(p_value, 6),
            significant: p_value < config.p_value_threshold,
        });
    }

    let optimum = lags
        .iter()
        .filter(|l| l.lag > 0)
        .fold(None, |best: Option<&XcorrLag>, lag| match best {
            Some(current) if current.correlation.abs() >= lag.correlation.abs() => Some(current),
            _ => Some(lag),
        });
    let (optimal_lag, max_correlation, optimal_p_value) = optimum
        .map(|l| (l.lag, l.correlation, l.p_value))
        .unwrap_or((0, 0.0, 1.0));

    Outcome::Ok(CrossCorrelation {
        interpretation: interpret_lag(optimal_lag, max_correlation),
        lags,
        optimal_lag,
        max_correlation,
        optimal_p_value,
    })
}

pub fn interpret_lag(lag: i32, correlation: f64) -> String {
    let strength = correlation.abs();
    if strength < WEAK_CORRELATION {
        return format!("weak relationship (r={correlation:.2}), no clear lead");
    }
    let kind = if strength >= 0.7 {
        "strong"
    } else if strength >= 0.4 {
        "moderate"
    } else {
        "mild"
    };
    let direction = if correlation > 0.0 { "positive" } else { "inverse" };
    match lag {
        0 => format!("{kind} {direction} same-day movement (r={correlation:.2})"),
        l if l > 0 => format!(
            "{kind} {direction} relationship: signal leads legislative activity by {l} day(s) \
             (r={correlation:.2})"
        ),
        l => format!(
            "{kind} {direction} relationship: legislative activity leads the signal by {} day(s) \
             (r={correlation:.2})",
            -l
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peak {
    pub index: usize,
    pub value: f64,
    pub z_score: f64,
}

pub fn detect_peaks(series: &[f64], z_threshold: f64) -> Vec<Peak> {
    if series.len() < MIN_PEAK_POINTS || population_std(series) == 0.0 {
        return Vec::new();
    }
    z_scores(series)
        .into_iter()
        .enumerate()
        .filter(|(_, z)| *z >= z_threshold)
        .map(|(index, z)| Peak {
            index,
            value: series[index],
            z_score: round_to(z, 2),
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SeriesSet {
    pub media: Vec<f64>,
    pub trends: Vec<f64>,
    pub legislative: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairAnalysis {
    pub granger: Outcome<GrangerReport>,
    pub xcorr: Outcome<CrossCorrelation>,
}

impl PairAnalysis {
    fn run(x: &[f64], y: &[f64], config: &LagConfig) -> Self {
        Self {
            granger: granger_test(x, y, config.granger_max_lag, config),
            xcorr: cross_correlation(x, y, config.cross_correlation_lags, config),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAnalysis {
    pub category: String,
    pub analysis_date: NaiveDate,
    pub media_legislative: PairAnalysis,
    pub trends_legislative: PairAnalysis,
    pub media_peaks: Vec<Peak>,
    pub legislative_peaks: Vec<Peak>,
}

pub fn analyze_series(
    category: &str,
    analysis_date: NaiveDate,
    series: &SeriesSet,
    config: &LagConfig,
) -> CategoryAnalysis {
    CategoryAnalysis {
        category: category.to_string(),
        analysis_date,
        media_legislative: PairAnalysis::run(&series.media, &series.legislative, config),
        trends_legislative: PairAnalysis::run(&series.trends, &series.legislative, config),
        media_peaks: detect_peaks(&series.media, config.peak_z_threshold),
        legislative_peaks: detect_peaks(&series.legislative, config.peak_z_threshold),
    }
}

impl CategoryAnalysis {
    /// One record per analysis type that produced a result.
    pub fn records(&self, p_value_threshold: f64) -> Vec<CorrelationRecord> {
        let pairs = [
            (
                &self.media_legislative,
                AnalysisType::GrangerMediaLegislative,
                AnalysisType::XcorrMediaLegislative,
            ),
            (
                &self.trends_legislative,
                AnalysisType::GrangerTrendsLegislative,
                AnalysisType::XcorrTrendsLegislative,
            ),
        ];

        let mut records = Vec::new();
        for (pair, granger_type, xcorr_type) in pairs {
            if let Outcome::Ok(report) = &pair.granger {
                if let Some(best) = report.best() {
                    records.push(CorrelationRecord {
                        category: self.category.clone(),
                        analysis_type: granger_type,
                        optimal_lag: best.lag as i32,
                        coefficient: best.f_statistic,
                        p_value: best.p_value,
                        significant: best.p_value < p_value_threshold,
                        detail: format!(
                            "F={:.4} p={:.6} over {} of {} lags, n={}",
                            best.f_statistic,
                            best.p_value,
                            report.lags.len(),
                            report.max_lag,
                            report.observations
                        ),
                        analysis_date: self.analysis_date,
                    });
                }
            }
            if let Outcome::Ok(xcorr) = &pair.xcorr {
                records.push(CorrelationRecord {
                    category: self.category.clone(),
                    analysis_type: xcorr_type,
                    optimal_lag: xcorr.optimal_lag,
                    coefficient: xcorr.max_correlation,
                    p_value: xcorr.optimal_p_value,
                    significant: xcorr.optimal_p_value < p_value_threshold,
                    detail: xcorr.interpretation.clone(),
                    analysis_date: self.analysis_date,
                });
            }
        }
        records
    }
}

/// Turns the latest media→legislature cross-correlation into an outlook.
pub fn prediction_from_record(category: &str, record: Option<&CorrelationRecord>) -> Prediction {
    let Some(record) = record else {
        return Prediction::NoData {
            category: category.to_string(),
        };
    };

    let strength = record.coefficient.abs();
    let confidence = if record.significant {
        (strength * 100.0).min(100.0)
    } else {
        strength * 50.0
    };
    let narrative = if record.significant {
        format!(
            "Media attention has preceded legislative activity by about {} day(s) \
             (r={:.2}, p={:.4}).",
            record.optimal_lag, record.coefficient, record.p_value
        )
    } else {
        format!(
            "No significant lead from media to legislative activity yet (r={:.2}, p={:.4}).",
            record.coefficient, record.p_value
        )
    };

    Prediction::Estimated {
        category: category.to_string(),
        lag_days: record.optimal_lag,
        coefficient: record.coefficient,
        significant: record.significant,
        confidence: round_to(confidence, 1),
        estimated_days: record.significant.then_some(record.optimal_lag),
        narrative,
    }
}

pub struct CorrelationEngine {
    config: Arc<AppConfig>,
    provider: Arc<dyn SignalProvider>,
    store: Arc<dyn ScoreStore>,
}

impl CorrelationEngine {
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

    pub async fn collect_series(
        &self,
        category: &Category,
        as_of: NaiveDate,
    ) -> EngineResult<SeriesSet> {
        let window = DateWindow::new(as_of, self.config.lag.window_days);
        let id = category.id.as_str();

        let media = self
            .provider
            .media_daily_counts(category.primary_keyword(), window)
            .await
            .map_err(EngineError::provider(Signal::Media, id))?;
        let trends = self
            .provider
            .trends_daily_series(category, window)
            .await
            .map_err(EngineError::provider(Signal::Trends, id))?;
        let legislative = self
            .provider
            .legislative_daily_counts(window)
            .await
            .map_err(EngineError::provider(Signal::Legislative, id))?;

        Ok(SeriesSet {
            media: align_daily(&media, &window),
            trends: align_daily(&trends, &window),
            legislative: align_daily(&legislative, &window),
        })
    }

    pub async fn analyze_category(
        &self,
        category: &Category,
        as_of: NaiveDate,
    ) -> EngineResult<CategoryAnalysis> {
        let series = self.collect_series(category, as_of).await?;
        let analysis = analyze_series(&category.id, as_of, &series, &self.config.lag);

        for (label, pair) in [
            ("media", &analysis.media_legislative),
            ("trends", &analysis.trends_legislative),
        ] {
            if !matches!(pair.granger, Outcome::Ok(_)) {
                tracing::debug!(
                    category = %category.id,
                    pair = label,
                    outcome = %pair.granger.describe(),
                    "Granger test produced no result"
                );
            }
            if !matches!(pair.xcorr, Outcome::Ok(_)) {
                tracing::debug!(
                    category = %category.id,
                    pair = label,
                    outcome = %pair.xcorr.describe(),
                    "Cross-correlation produced no result"
                );
            }
        }

        let records = analysis.records(self.config.lag.p_value_threshold);
        for record in &records {
            self.store
                .upsert_correlation(record)
                .await
                .map_err(EngineError::Persistence)?;
        }

        tracing::info!(
            category = %category.id,
            records = records.len(),
            media_peaks = analysis.media_peaks.len(),
            legislative_peaks = analysis.legislative_peaks.len(),
            "Correlation analysis stored"
        );

        Ok(analysis)
    }

    /// Analyses every registered category; failures are logged and skipped.
    pub async fn analyze_all_categories(&self, as_of: NaiveDate) -> Vec<CategoryAnalysis> {
        let concurrency = self.config.batch.concurrency.max(1);
        let results: Vec<(String, EngineResult<CategoryAnalysis>)> =
            stream::iter(self.config.categories.iter())
                .map(|category| async move {
                    (
                        category.id.clone(),
                        self.analyze_category(category, as_of).await,
                    )
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut analyses = Vec::with_capacity(results.len());
        for (category, result) in results {
            match result {
                Ok(analysis) => analyses.push(analysis),
                Err(error) => {
                    tracing::warn!(
                        category = %category,
                        error = %error,
                        "Skipping category for this run"
                    );
                }
            }
        }
        analyses.sort_by(|a, b| a.category.cmp(&b.category));
        analyses
    }

    pub async fn get_prediction(&self, category: &str) -> EngineResult<Prediction> {
        self.config.category(category)?;
        let record = self
            .store
            .latest_correlation(category, AnalysisType::XcorrMediaLegislative)
            .await
            .map_err(EngineError::Persistence)?;
        Ok(prediction_from_record(category, record.as_ref()))
    }
}
