use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{AppConfig, Category, SessionPhase, UrgencyConfig};
use crate::error::{EngineError, EngineResult};
use crate::models::{AnalysisType, CorrelationRecord, Signal};
use crate::providers::SignalProvider;
use crate::stats::round_to;
use crate::store::ScoreStore;

/// Everything the estimate depends on, gathered before any arithmetic.
#[derive(Debug, Clone)]
pub struct UrgencyEvidence {
    pub correlation: Option<CorrelationRecord>,
    pub recent_filings: i64,
    pub baseline_filings: i64,
    pub phase: SessionPhase,
    pub calendar_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrgencyBreakdown {
    pub correlation_component: f64,
    pub velocity_component: f64,
    pub calendar_component: f64,
    pub acceleration: Option<f64>,
    pub calendar_multiplier: f64,
    pub urgency: f64,
}

pub fn correlation_component(record: Option<&CorrelationRecord>, config: &UrgencyConfig) -> f64 {
    match record {
        Some(r) if r.significant => {
            (r.coefficient.abs() * config.significant_multiplier).min(config.significant_cap)
        }
        Some(r) => (r.coefficient.abs() * config.weak_multiplier).min(config.weak_cap),
        None => 0.0,
    }
}

/// Recent filings over the baseline rescaled to the recent window; `None` without a baseline.
pub fn filing_acceleration(recent: i64, baseline: i64, config: &UrgencyConfig) -> Option<f64> {
    if baseline <= 0 {
        return None;
    }
    let baseline_rate =
        baseline as f64 * f64::from(config.recent_days) / f64::from(config.baseline_days);
    (baseline_rate > 0.0).then(|| recent as f64 / baseline_rate)
}

pub fn velocity_component(acceleration: Option<f64>, config: &UrgencyConfig) -> f64 {
    acceleration
        .map(|a| (a * config.acceleration_multiplier).min(config.acceleration_cap))
        .unwrap_or(0.0)
}

pub fn calendar_component(
    multiplier: f64,
    media_score: f64,
    trends_score: f64,
    config: &UrgencyConfig,
) -> f64 {
    let pressure =
        config.pressure_media_share * media_score + config.pressure_trends_share * trends_score;
    if multiplier < 1.0 || pressure <= config.pressure_threshold {
        return 0.0;
    }
    if multiplier >= 1.5 {
        (pressure * config.session_multiplier).min(config.session_cap)
    } else {
        (pressure * config.transitional_multiplier).min(config.transitional_cap)
    }
}

pub fn urgency_from_evidence(
    evidence: &UrgencyEvidence,
    media_score: f64,
    trends_score: f64,
    config: &UrgencyConfig,
) -> UrgencyBreakdown {
    let acceleration =
        filing_acceleration(evidence.recent_filings, evidence.baseline_filings, config);
    let correlation = correlation_component(evidence.correlation.as_ref(), config);
    let velocity = velocity_component(acceleration, config);
    let calendar = calendar_component(
        evidence.calendar_multiplier,
        media_score,
        trends_score,
        config,
    );

    let significant = evidence
        .correlation
        .as_ref()
        .map(|r| r.significant)
        .unwrap_or(false);
    let accelerating = acceleration.map(|a| a > 1.0).unwrap_or(false);

    let urgency = if config.require_evidence && !significant && !accelerating {
        0.0
    } else {
        let weighted = correlation * config.correlation_weight
            + velocity * config.velocity_weight
            + calendar * config.calendar_weight;
        round_to(weighted, 2).min(100.0)
    };

    UrgencyBreakdown {
        correlation_component: round_to(correlation, 2),
        velocity_component: round_to(velocity, 2),
        calendar_component: round_to(calendar, 2),
        acceleration: acceleration.map(|a| round_to(a, 4)),
        calendar_multiplier: evidence.calendar_multiplier,
        urgency,
    }
}

pub struct UrgencyEstimator {
    config: Arc<AppConfig>,
    provider: Arc<dyn SignalProvider>,
    store: Arc<dyn ScoreStore>,
}

impl UrgencyEstimator {
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

    pub fn calendar_factor(&self, as_of: NaiveDate) -> f64 {
        self.config.calendar.phase_on(as_of).1
    }

    pub async fn gather_evidence(
        &self,
        category: &Category,
        as_of: NaiveDate,
    ) -> EngineResult<UrgencyEvidence> {
        let correlation = self
            .store
            .latest_correlation(&category.id, AnalysisType::XcorrMediaLegislative)
            .await
            .map_err(EngineError::Persistence)?;

        let urgency = &self.config.urgency;
        let recent_filings = self
            .provider
            .count_recent_filings(category, urgency.recent_days, as_of)
            .await
            .map_err(EngineError::provider(Signal::Urgency, &category.id))?;
        let baseline_filings = self
            .provider
            .count_recent_filings(category, urgency.baseline_days, as_of)
            .await
            .map_err(EngineError::provider(Signal::Urgency, &category.id))?;

        let (phase, calendar_multiplier) = self.config.calendar.phase_on(as_of);

        Ok(UrgencyEvidence {
            correlation,
            recent_filings,
            baseline_filings,
            phase,
            calendar_multiplier,
        })
    }

    pub async fn estimate_urgency(
        &self,
        category: &Category,
        media_score: f64,
        trends_score: f64,
        as_of: NaiveDate,
    ) -> EngineResult<UrgencyBreakdown> {
        let evidence = self.gather_evidence(category, as_of).await?;
        let breakdown =
            urgency_from_evidence(&evidence, media_score, trends_score, &self.config.urgency);

        tracing::debug!(
            category = %category.id,
            phase = ?evidence.phase,
            correlation = breakdown.correlation_component,
            velocity = breakdown.velocity_component,
            calendar = breakdown.calendar_component,
            urgency = breakdown.urgency,
            "Urgency estimated"
        );

        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(coefficient: f64, significant: bool) -> CorrelationRecord {
        CorrelationRecord {
            category: "energy".to_string(),
            analysis_type: AnalysisType::XcorrMediaLegislative,
            optimal_lag: 5,
            coefficient,
            p_value: if significant { 0.01 } else { 0.3 },
            significant,
            detail: String::new(),
            analysis_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        }
    }

    fn evidence(
        correlation: Option<CorrelationRecord>,
        recent: i64,
        baseline: i64,
        multiplier: f64,
    ) -> UrgencyEvidence {
        let phase = if multiplier >= 1.5 {
            SessionPhase::Ordinary
        } else if multiplier >= 1.0 {
            SessionPhase::Transitional
        } else {
            SessionPhase::Recess
        };
        UrgencyEvidence {
            correlation,
            recent_filings: recent,
            baseline_filings: baseline,
            phase,
            calendar_multiplier: multiplier,
        }
    }

    #[test]
    fn correlation_component_discounts_insignificant_evidence() {
        let config = UrgencyConfig::default();
        assert_eq!(correlation_component(None, &config), 0.0);
        assert!((correlation_component(Some(&record(0.5, true)), &config) - 75.0).abs() < 1e-9);
        assert_eq!(correlation_component(Some(&record(0.8, true)), &config), 100.0);
        assert!((correlation_component(Some(&record(-0.4, false)), &config) - 20.0).abs() < 1e-9);
        assert_eq!(correlation_component(Some(&record(0.9, false)), &config), 30.0);
    }

    #[test]
    fn acceleration_uses_fourteen_day_equivalent_baseline() {
        let config = UrgencyConfig::default();
        assert_eq!(filing_acceleration(3, 0, &config), None);
        // 60 filings over 60 days is 14 per 14 days
        let a = filing_acceleration(28, 60, &config).unwrap();
        assert!((a - 2.0).abs() < 1e-9);
        assert_eq!(velocity_component(Some(2.0), &config), 80.0);
        assert_eq!(velocity_component(Some(4.0), &config), 100.0);
        assert_eq!(velocity_component(None, &config), 0.0);
    }

    #[test]
    fn calendar_requires_session_and_real_pressure() {
        let config = UrgencyConfig::default();
        // pressure = 0.6 * 80 + 0.4 * 60 = 72
        assert!((calendar_component(1.5, 80.0, 60.0, &config) - 57.6).abs() < 1e-9);
        assert!((calendar_component(1.0, 80.0, 60.0, &config) - 28.8).abs() < 1e-9);
        assert_eq!(calendar_component(0.5, 80.0, 60.0, &config), 0.0);
        // pressure = 50 is not above the threshold
        assert_eq!(calendar_component(1.5, 50.0, 50.0, &config), 0.0);
    }

    #[test]
    fn weak_evidence_in_recess_yields_zero() {
        let config = UrgencyConfig::default();
        let cases = [
            evidence(None, 0, 0, 0.5),
            evidence(Some(record(0.6, false)), 2, 60, 0.5),
            evidence(Some(record(0.3, false)), 14, 60, 0.5),
        ];
        for case in &cases {
            let breakdown = urgency_from_evidence(case, 90.0, 90.0, &config);
            assert_eq!(breakdown.urgency, 0.0, "{case:?}");
        }
    }

    #[test]
    fn calendar_alone_never_creates_urgency() {
        let config = UrgencyConfig::default();
        let breakdown = urgency_from_evidence(&evidence(None, 0, 0, 1.5), 100.0, 100.0, &config);
        assert!(breakdown.calendar_component > 0.0);
        assert_eq!(breakdown.urgency, 0.0);
    }

    #[test]
    fn combines_components_with_fixed_shares() {
        let config = UrgencyConfig::default();
        // correlation 75, acceleration 2.0 -> 80, calendar 57.6
        let breakdown = urgency_from_evidence(
            &evidence(Some(record(0.5, true)), 28, 60, 1.5),
            80.0,
            60.0,
            &config,
        );
        assert_eq!(breakdown.correlation_component, 75.0);
        assert_eq!(breakdown.velocity_component, 80.0);
        assert_eq!(breakdown.calendar_component, 57.6);
        assert_eq!(breakdown.urgency, 73.52);
    }

    #[test]
    fn acceleration_alone_counts_as_evidence() {
        let config = UrgencyConfig::default();
        let breakdown = urgency_from_evidence(&evidence(None, 7, 15, 0.5), 0.0, 0.0, &config);
        // baseline rate 3.5, acceleration 2.0 -> component 80 -> 32
        assert_eq!(breakdown.urgency, 32.0);
    }

    #[test]
    fn evidence_gate_can_be_disabled() {
        let config = UrgencyConfig {
            require_evidence: false,
            ..UrgencyConfig::default()
        };
        let weak = evidence(Some(record(0.4, false)), 0, 0, 0.5);
        let breakdown = urgency_from_evidence(&weak, 0.0, 0.0, &config);
        assert_eq!(breakdown.urgency, 8.0);
    }
}
