use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Media,
    Trends,
    Legislative,
    Speech,
    Urgency,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Media => "media",
            Signal::Trends => "trends",
            Signal::Legislative => "legislative",
            Signal::Speech => "speech",
            Signal::Urgency => "urgency",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Yellow,
    Red,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Red => "red",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(Color::Green),
            "yellow" => Ok(Color::Yellow),
            "red" => Ok(Color::Red),
            other => Err(anyhow!("unknown color {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub date: NaiveDate,
    pub score_total: f64,
    pub score_media: f64,
    pub score_trends: f64,
    pub score_legislative: f64,
    pub score_speech: f64,
    pub score_urgency: f64,
    pub color: Color,
    pub calendar_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub category: String,
    pub kind: String,
    pub score: f64,
    pub color: Color,
    pub message: String,
    /// Date of the score that raised the alert; unique per (category, kind).
    pub score_date: NaiveDate,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub const HIGH_SCORE: &'static str = "high_score";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    XcorrMediaLegislative,
    GrangerMediaLegislative,
    XcorrTrendsLegislative,
    GrangerTrendsLegislative,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::XcorrMediaLegislative => "xcorr_media_legislative",
            AnalysisType::GrangerMediaLegislative => "granger_media_legislative",
            AnalysisType::XcorrTrendsLegislative => "xcorr_trends_legislative",
            AnalysisType::GrangerTrendsLegislative => "granger_trends_legislative",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xcorr_media_legislative" => Ok(AnalysisType::XcorrMediaLegislative),
            "granger_media_legislative" => Ok(AnalysisType::GrangerMediaLegislative),
            "xcorr_trends_legislative" => Ok(AnalysisType::XcorrTrendsLegislative),
            "granger_trends_legislative" => Ok(AnalysisType::GrangerTrendsLegislative),
            other => Err(anyhow!("unknown analysis type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub category: String,
    pub analysis_type: AnalysisType,
    pub optimal_lag: i32,
    pub coefficient: f64,
    pub p_value: f64,
    pub significant: bool,
    pub detail: String,
    pub analysis_date: NaiveDate,
}

/// Lag-based outlook for a category, derived from its latest cross-correlation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Prediction {
    NoData {
        category: String,
    },
    Estimated {
        category: String,
        lag_days: i32,
        coefficient: f64,
        significant: bool,
        confidence: f64,
        estimated_days: Option<i32>,
        narrative: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Hit,
    Overestimate,
    Underestimate,
}

impl ResolutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionOutcome::Hit => "hit",
            ResolutionOutcome::Overestimate => "overestimate",
            ResolutionOutcome::Underestimate => "underestimate",
        }
    }
}

impl FromStr for ResolutionOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hit" => Ok(ResolutionOutcome::Hit),
            "overestimate" => Ok(ResolutionOutcome::Overestimate),
            "underestimate" => Ok(ResolutionOutcome::Underestimate),
            other => Err(anyhow!("unknown resolution outcome {other:?}")),
        }
    }
}

/// One category's predicted-vs-realized verdict for a single ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub week: String,
    pub week_start: NaiveDate,
    pub category: String,
    pub average_score: f64,
    pub predicted_color: Color,
    pub realized_filings: i64,
    pub historical_weekly_average: f64,
    pub hit: bool,
    pub outcome: ResolutionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyAccuracy {
    pub week: String,
    pub week_start: NaiveDate,
    pub accuracy: f64,
    pub hits: usize,
    pub total: usize,
    pub detail: Vec<Resolution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionSummary {
    pub global_accuracy: f64,
    pub weeks: Vec<WeeklyAccuracy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub source: String,
    pub category: Option<String>,
    pub keyword: Option<String>,
    pub observed_on: NaiveDate,
    pub value: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub source_key: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

/// Trailing window of `days` calendar days ending on (and including) `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub end: NaiveDate,
    pub days: u32,
}

impl DateWindow {
    pub fn new(end: NaiveDate, days: u32) -> Self {
        Self {
            end,
            days: days.max(1),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.end - chrono::Duration::days(i64::from(self.days) - 1)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start();
        (0..i64::from(self.days)).map(move |offset| start + chrono::Duration::days(offset))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end
    }
}
