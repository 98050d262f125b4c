use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::bail;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::Category;
use crate::models::DateWindow;
use crate::providers::SignalProvider;

#[derive(Default)]
pub struct FixedProvider {
    scores: HashMap<String, [f64; 4]>,
    filings: HashMap<String, (i64, i64)>,
    failing_media: HashSet<String>,
    media_series: HashMap<String, BTreeMap<NaiveDate, f64>>,
    trends_series: HashMap<String, BTreeMap<NaiveDate, f64>>,
    legislative_series: BTreeMap<NaiveDate, f64>,
    filing_series: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl FixedProvider {
    pub fn with_scores(
        mut self,
        category: &str,
        media: f64,
        trends: f64,
        legislative: f64,
        speech: f64,
    ) -> Self {
        self.scores
            .insert(category.to_string(), [media, trends, legislative, speech]);
        self
    }

    /// `recent` answers windows shorter than 30 days, `baseline` the rest.
    pub fn with_filings(mut self, category: &str, recent: i64, baseline: i64) -> Self {
        self.filings.insert(category.to_string(), (recent, baseline));
        self
    }

    pub fn failing_media(mut self, category: &str) -> Self {
        self.failing_media.insert(category.to_string());
        self
    }

    pub fn with_media_series(mut self, keyword: &str, series: BTreeMap<NaiveDate, f64>) -> Self {
        self.media_series.insert(keyword.to_string(), series);
        self
    }

    pub fn with_trends_series(mut self, category: &str, series: BTreeMap<NaiveDate, f64>) -> Self {
        self.trends_series.insert(category.to_string(), series);
        self
    }

    pub fn with_legislative_series(mut self, series: BTreeMap<NaiveDate, f64>) -> Self {
        self.legislative_series = series;
        self
    }

    pub fn with_filing_series(mut self, category: &str, series: BTreeMap<NaiveDate, f64>) -> Self {
        self.filing_series.insert(category.to_string(), series);
        self
    }

    fn score(&self, category: &Category, index: usize) -> f64 {
        self.scores
            .get(&category.id)
            .map(|s| s[index])
            .unwrap_or(0.0)
    }
}

fn clip(series: Option<&BTreeMap<NaiveDate, f64>>, window: DateWindow) -> BTreeMap<NaiveDate, f64> {
    series
        .map(|s| {
            s.iter()
                .filter(|(day, _)| window.contains(**day))
                .map(|(day, value)| (*day, *value))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SignalProvider for FixedProvider {
    async fn media_score(&self, category: &Category, _window: DateWindow) -> anyhow::Result<f64> {
        if self.failing_media.contains(&category.id) {
            bail!("media source unavailable");
        }
        Ok(self.score(category, 0))
    }

    async fn media_daily_counts(
        &self,
        keyword: &str,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        Ok(clip(self.media_series.get(keyword), window))
    }

    async fn trends_score(&self, category: &Category, _window: DateWindow) -> anyhow::Result<f64> {
        Ok(self.score(category, 1))
    }

    async fn trends_daily_series(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        Ok(clip(self.trends_series.get(&category.id), window))
    }

    async fn legislative_score(
        &self,
        category: &Category,
        _window: DateWindow,
    ) -> anyhow::Result<f64> {
        Ok(self.score(category, 2))
    }

    async fn legislative_daily_counts(
        &self,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        Ok(clip(Some(&self.legislative_series), window))
    }

    async fn speech_mention_score(
        &self,
        category: &Category,
        _window: DateWindow,
    ) -> anyhow::Result<f64> {
        Ok(self.score(category, 3))
    }

    async fn count_recent_filings(
        &self,
        category: &Category,
        days: u32,
        _as_of: NaiveDate,
    ) -> anyhow::Result<i64> {
        let (recent, baseline) = self.filings.get(&category.id).copied().unwrap_or((0, 0));
        Ok(if days < 30 { recent } else { baseline })
    }

    async fn filing_daily_counts(
        &self,
        category: &Category,
        window: DateWindow,
    ) -> anyhow::Result<BTreeMap<NaiveDate, f64>> {
        Ok(clip(self.filing_series.get(&category.id), window))
    }
}
