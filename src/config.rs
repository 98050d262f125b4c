use chrono::{Datelike, NaiveDate};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::Color;

/// Immutable engine configuration, built once at startup and shared by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scoring: ScoringConfig,
    pub urgency: UrgencyConfig,
    pub calendar: CalendarConfig,
    pub lag: LagConfig,
    pub windows: SignalWindows,
    pub batch: BatchConfig,
    pub resolution: ResolutionConfig,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
}

impl Category {
    pub fn new(id: &str, name: &str, keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Keyword used to build the media mention series for lag analysis.
    pub fn primary_keyword(&self) -> &str {
        self.keywords.first().map(String::as_str).unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: Weights,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub media: f64,
    pub trends: f64,
    pub legislative: f64,
    pub speech: f64,
    pub urgency: f64,
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.media + self.trends + self.legislative + self.speech + self.urgency
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            media: 0.25,
            trends: 0.15,
            legislative: 0.30,
            speech: 0.15,
            urgency: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub green: f64,
    pub yellow: f64,
}

impl Thresholds {
    pub fn classify(&self, score: f64) -> Color {
        if score >= self.green {
            Color::Green
        } else if score >= self.yellow {
            Color::Yellow
        } else {
            Color::Red
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            green: 70.0,
            yellow: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrgencyConfig {
    pub correlation_weight: f64,
    pub velocity_weight: f64,
    pub calendar_weight: f64,
    pub significant_multiplier: f64,
    pub significant_cap: f64,
    pub weak_multiplier: f64,
    pub weak_cap: f64,
    pub acceleration_multiplier: f64,
    pub acceleration_cap: f64,
    pub recent_days: u32,
    pub baseline_days: u32,
    pub pressure_media_share: f64,
    pub pressure_trends_share: f64,
    pub pressure_threshold: f64,
    pub session_multiplier: f64,
    pub session_cap: f64,
    pub transitional_multiplier: f64,
    pub transitional_cap: f64,
    /// Zero the estimate unless a significant correlation or filing acceleration exists.
    pub require_evidence: bool,
}

impl Default for UrgencyConfig {
    fn default() -> Self {
        Self {
            correlation_weight: 0.40,
            velocity_weight: 0.40,
            calendar_weight: 0.20,
            significant_multiplier: 150.0,
            significant_cap: 100.0,
            weak_multiplier: 50.0,
            weak_cap: 30.0,
            acceleration_multiplier: 40.0,
            acceleration_cap: 100.0,
            recent_days: 14,
            baseline_days: 60,
            pressure_media_share: 0.6,
            pressure_trends_share: 0.4,
            pressure_threshold: 50.0,
            session_multiplier: 0.8,
            session_cap: 100.0,
            transitional_multiplier: 0.4,
            transitional_cap: 50.0,
            require_evidence: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Ordinary,
    Extraordinary,
    Transitional,
    Recess,
}

/// A yearly recurring span of the legislative calendar, bounds given as "MM-DD".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: String,
    pub end: String,
    pub phase: SessionPhase,
    pub multiplier: f64,
}

impl SessionWindow {
    fn contains(&self, month_day: (u32, u32)) -> bool {
        let (Some(start), Some(end)) = (parse_month_day(&self.start), parse_month_day(&self.end))
        else {
            return false;
        };
        if start <= end {
            start <= month_day && month_day <= end
        } else {
            month_day >= start || month_day <= end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub windows: Vec<SessionWindow>,
    pub recess_multiplier: f64,
}

impl CalendarConfig {
    /// Phase and multiplier for a date; the first matching window wins.
    pub fn phase_on(&self, date: NaiveDate) -> (SessionPhase, f64) {
        let month_day = (date.month(), date.day());
        self.windows
            .iter()
            .find(|w| w.contains(month_day))
            .map(|w| (w.phase, w.multiplier))
            .unwrap_or((SessionPhase::Recess, self.recess_multiplier))
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        let window = |start: &str, end: &str, phase, multiplier| SessionWindow {
            start: start.to_string(),
            end: end.to_string(),
            phase,
            multiplier,
        };
        Self {
            windows: vec![
                window("09-01", "12-15", SessionPhase::Ordinary, 1.5),
                window("02-01", "04-30", SessionPhase::Ordinary, 1.5),
                window("01-15", "01-31", SessionPhase::Transitional, 1.0),
                window("08-15", "08-31", SessionPhase::Transitional, 1.0),
            ],
            recess_multiplier: 0.5,
        }
    }
}

fn parse_month_day(value: &str) -> Option<(u32, u32)> {
    let (month, day) = value.split_once('-')?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    ((1..=12).contains(&month) && (1..=31).contains(&day)).then_some((month, day))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagConfig {
    pub window_days: u32,
    pub granger_max_lag: usize,
    pub cross_correlation_lags: usize,
    pub p_value_threshold: f64,
    pub min_observations: usize,
    pub peak_z_threshold: f64,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            granger_max_lag: 7,
            cross_correlation_lags: 14,
            p_value_threshold: 0.05,
            min_observations: 15,
            peak_z_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWindows {
    pub media_days: u32,
    pub trends_days: u32,
    pub legislative_days: u32,
    pub speech_days: u32,
}

impl Default for SignalWindows {
    fn default() -> Self {
        Self {
            media_days: 7,
            trends_days: 7,
            legislative_days: 7,
            speech_days: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Weeks of scores and filings considered per run.
    pub lookback_weeks: u32,
    /// Average weekly score at or above which high activity is predicted.
    pub high_score: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            lookback_weeks: 26,
            high_score: 50.0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig {
                weights: Weights::default(),
                thresholds: Thresholds::default(),
            },
            urgency: UrgencyConfig::default(),
            calendar: CalendarConfig::default(),
            lag: LagConfig::default(),
            windows: SignalWindows::default(),
            batch: BatchConfig::default(),
            resolution: ResolutionConfig::default(),
            categories: default_categories(),
        }
    }
}

impl AppConfig {
    pub fn load() -> EngineResult<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // LEGISLATIVE_PULSE__SCORING__WEIGHTS__MEDIA, etc.
            .add_source(
                Environment::with_prefix("LEGISLATIVE_PULSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: AppConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> EngineResult<()> {
        let sum = self.scoring.weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EngineError::InvalidConfig(format!(
                "scoring weights must sum to 1.0, got {sum:.6}"
            )));
        }
        if self.categories.is_empty() {
            return Err(EngineError::InvalidConfig(
                "category registry is empty".to_string(),
            ));
        }
        if self.lag.window_days == 0 || self.lag.granger_max_lag == 0 {
            return Err(EngineError::InvalidConfig(
                "lag window and granger max lag must be positive".to_string(),
            ));
        }
        if self.urgency.recent_days == 0 || self.urgency.baseline_days == 0 {
            return Err(EngineError::InvalidConfig(
                "filing velocity windows must be positive".to_string(),
            ));
        }
        if self.resolution.lookback_weeks == 0 {
            return Err(EngineError::InvalidConfig(
                "resolution lookback must cover at least one week".to_string(),
            ));
        }
        if self.batch.concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "batch concurrency must be at least 1".to_string(),
            ));
        }
        for window in &self.calendar.windows {
            if parse_month_day(&window.start).is_none() || parse_month_day(&window.end).is_none() {
                return Err(EngineError::InvalidConfig(format!(
                    "calendar window {}..{} is not in MM-DD form",
                    window.start, window.end
                )));
            }
        }
        Ok(())
    }

    pub fn category(&self, id: &str) -> EngineResult<&Category> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::UnknownCategory(id.to_string()))
    }
}

fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            "security_justice",
            "Security and Justice",
            &[
                "security",
                "justice",
                "criminal code",
                "national guard",
                "organized crime",
                "homicide",
                "prosecutor",
                "extortion",
            ],
        ),
        Category::new(
            "economy_finance",
            "Economy and Finance",
            &[
                "budget",
                "taxes",
                "inflation",
                "public debt",
                "fiscal reform",
                "tariffs",
                "foreign investment",
                "deficit",
            ],
        ),
        Category::new(
            "energy",
            "Energy",
            &[
                "energy",
                "oil",
                "electricity",
                "hydrocarbons",
                "gasoline",
                "renewables",
                "lithium",
                "refinery",
            ],
        ),
        Category::new(
            "health",
            "Health",
            &[
                "health",
                "hospital",
                "medicine shortage",
                "vaccine",
                "epidemic",
                "mental health",
                "fentanyl",
            ],
        ),
        Category::new(
            "education",
            "Education",
            &[
                "education",
                "school",
                "university",
                "teachers",
                "scholarships",
                "textbooks",
                "science funding",
            ],
        ),
        Category::new(
            "labor",
            "Labor",
            &[
                "employment",
                "minimum wage",
                "union",
                "outsourcing",
                "pension",
                "working hours",
                "strike",
            ],
        ),
        Category::new(
            "electoral_political",
            "Electoral and Political",
            &[
                "electoral reform",
                "election",
                "electoral institute",
                "political party",
                "recall vote",
                "coalition",
            ],
        ),
        Category::new(
            "human_rights",
            "Human Rights",
            &[
                "human rights",
                "discrimination",
                "gender equality",
                "migrants",
                "indigenous",
                "press freedom",
                "human trafficking",
            ],
        ),
        Category::new(
            "infrastructure",
            "Infrastructure",
            &[
                "infrastructure",
                "highway",
                "railway",
                "airport",
                "public works",
                "housing",
                "water",
                "civil protection",
            ],
        ),
        Category::new(
            "agriculture_rural",
            "Agriculture and Rural Development",
            &[
                "agriculture",
                "farmers",
                "corn",
                "food security",
                "fisheries",
                "livestock",
                "glyphosate",
            ],
        ),
        Category::new(
            "foreign_affairs",
            "Foreign Affairs",
            &[
                "foreign policy",
                "trade agreement",
                "border",
                "embassy",
                "treaty",
                "deportations",
                "remittances",
            ],
        ),
        Category::new(
            "anticorruption",
            "Anticorruption",
            &[
                "corruption",
                "embezzlement",
                "transparency",
                "audit office",
                "money laundering",
                "bribery",
            ],
        ),
        Category::new(
            "environment_climate",
            "Environment and Climate Change",
            &[
                "environment",
                "climate change",
                "emissions",
                "deforestation",
                "protected areas",
                "pollution",
                "drought",
            ],
        ),
        Category::new(
            "artificial_intelligence",
            "Artificial Intelligence",
            &[
                "artificial intelligence",
                "algorithms",
                "personal data",
                "cybersecurity",
                "digital platforms",
                "deepfakes",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.categories.len(), 14);
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let mut config = AppConfig::default();
        config.scoring.weights.media = 0.5;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn thresholds_are_exact_at_boundaries() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.classify(70.0), Color::Green);
        assert_eq!(thresholds.classify(69.99), Color::Yellow);
        assert_eq!(thresholds.classify(40.0), Color::Yellow);
        assert_eq!(thresholds.classify(39.99), Color::Red);
    }

    #[test]
    fn calendar_phases_follow_default_windows() {
        let calendar = CalendarConfig::default();
        let day = |m, d| NaiveDate::from_ymd_opt(2026, m, d).unwrap();

        assert_eq!(calendar.phase_on(day(10, 3)), (SessionPhase::Ordinary, 1.5));
        assert_eq!(calendar.phase_on(day(12, 15)), (SessionPhase::Ordinary, 1.5));
        assert_eq!(calendar.phase_on(day(3, 20)), (SessionPhase::Ordinary, 1.5));
        assert_eq!(calendar.phase_on(day(1, 20)), (SessionPhase::Transitional, 1.0));
        assert_eq!(calendar.phase_on(day(6, 10)), (SessionPhase::Recess, 0.5));
        assert_eq!(calendar.phase_on(day(12, 16)), (SessionPhase::Recess, 0.5));
    }

    #[test]
    fn wrapping_window_spans_new_year() {
        let calendar = CalendarConfig {
            windows: vec![SessionWindow {
                start: "12-20".to_string(),
                end: "01-05".to_string(),
                phase: SessionPhase::Extraordinary,
                multiplier: 2.0,
            }],
            recess_multiplier: 0.5,
        };
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(calendar.phase_on(day(2026, 12, 28)).0, SessionPhase::Extraordinary);
        assert_eq!(calendar.phase_on(day(2027, 1, 2)).0, SessionPhase::Extraordinary);
        assert_eq!(calendar.phase_on(day(2027, 1, 6)).0, SessionPhase::Recess);
    }

    #[test]
    fn primary_keyword_is_first_keyword() {
        let category = Category::new("energy", "Energy", &["energy", "oil"]);
        assert_eq!(category.primary_keyword(), "energy");
    }
}
