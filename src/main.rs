use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod correlation;
mod db;
mod error;
mod models;
mod providers;
mod report;
mod resolution;
mod scoring;
mod stats;
mod store;
#[cfg(test)]
mod testing;
mod urgency;

use crate::config::AppConfig;
use crate::correlation::CorrelationEngine;
use crate::models::Prediction;
use crate::providers::{PgSignalProvider, SignalProvider};
use crate::resolution::ResolutionTracker;
use crate::scoring::ScoringEngine;
use crate::store::ScoreStore;

#[derive(Parser)]
#[command(name = "legislative-pulse")]
#[command(about = "Legislative activity traffic light", long_about = None)]
struct Cli {
    /// Evaluate as of this date (YYYY-MM-DD) instead of today
    #[arg(long, global = true)]
    as_of: Option<NaiveDate>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load synthetic observations for a few categories
    Seed,
    /// Import observations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score every category and raise alerts
    Score,
    /// Run lag analysis for every category and store the results
    Correlate,
    /// Show the latest score per category
    Latest {
        #[arg(long)]
        json: bool,
    },
    /// Show a category's score history
    History {
        #[arg(long)]
        category: String,
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long)]
        json: bool,
    },
    /// Show recent alerts
    Alerts {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show the lag-based outlook for a category
    Predict {
        #[arg(long)]
        category: String,
        #[arg(long)]
        json: bool,
    },
    /// Resolve completed weeks and show prediction accuracy
    Resolve {
        #[arg(long, default_value_t = 12)]
        weeks: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("legislative_pulse=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let as_of = cli.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store: Arc<dyn ScoreStore> = Arc::new(db::PgStore::new(pool.clone()));
    let provider: Arc<dyn SignalProvider> = Arc::new(PgSignalProvider::new(pool.clone()));
    let scoring = ScoringEngine::new(config.clone(), provider.clone(), store.clone());
    let correlation = CorrelationEngine::new(config.clone(), provider.clone(), store.clone());
    let resolutions = ResolutionTracker::new(config.clone(), provider, store);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool, as_of).await?;
            println!("Inserted {inserted} seed observations.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} observations from {}.", csv.display());
        }
        Commands::Score => {
            let scores = scoring.compute_all_scores(as_of).await;
            if scores.is_empty() {
                println!("No category could be scored.");
                return Ok(());
            }
            println!("Scores for {as_of}:");
            for score in &scores {
                println!(
                    "- {} {} {:.2} (media {:.1}, trends {:.1}, legislative {:.1}, \
                     speech {:.1}, urgency {:.1})",
                    score.category,
                    score.color,
                    score.score_total,
                    score.score_media,
                    score.score_trends,
                    score.score_legislative,
                    score.score_speech,
                    score.score_urgency
                );
            }
        }
        Commands::Correlate => {
            let analyses = correlation.analyze_all_categories(as_of).await;
            let threshold = config.lag.p_value_threshold;
            for analysis in &analyses {
                let records = analysis.records(threshold);
                if records.is_empty() {
                    println!("- {}: not enough signal", analysis.category);
                    continue;
                }
                for record in records {
                    println!(
                        "- {} {}: lag {} coefficient {:.4} p {:.6}{}",
                        record.category,
                        record.analysis_type,
                        record.optimal_lag,
                        record.coefficient,
                        record.p_value,
                        if record.significant { " (significant)" } else { "" }
                    );
                }
            }
        }
        Commands::Latest { json } => {
            let latest = scoring.get_latest_scores().await?;
            if json {
                return print_json(&latest);
            }
            for (category, score) in report::latest_by_category(&config.categories, &latest) {
                match score {
                    Some(s) => println!(
                        "- {}: {} {:.2} on {}",
                        category.name, s.color, s.score_total, s.date
                    ),
                    None => println!("- {}: no data yet", category.name),
                }
            }
        }
        Commands::History {
            category,
            days,
            json,
        } => {
            let history = scoring.get_score_history(&category, days, as_of).await?;
            if json {
                return print_json(&history);
            }
            if history.is_empty() {
                println!("No scores for {category} in the last {days} days.");
            }
            for score in &history {
                println!("- {} {} {:.2}", score.date, score.color, score.score_total);
            }
        }
        Commands::Alerts { limit, json } => {
            let alerts = scoring.get_recent_alerts(limit).await?;
            if json {
                return print_json(&alerts);
            }
            if alerts.is_empty() {
                println!("No alerts raised.");
            }
            for alert in &alerts {
                println!(
                    "- {} [{}] {}",
                    alert.timestamp.format("%Y-%m-%d %H:%M"),
                    alert.kind,
                    alert.message
                );
            }
        }
        Commands::Predict { category, json } => {
            let prediction = correlation.get_prediction(&category).await?;
            if json {
                return print_json(&prediction);
            }
            match prediction {
                Prediction::NoData { category } => {
                    println!("{category}: no correlation analysis stored yet.")
                }
                Prediction::Estimated {
                    category,
                    confidence,
                    estimated_days,
                    narrative,
                    ..
                } => {
                    let eta = estimated_days
                        .map(|d| format!("~{d} days"))
                        .unwrap_or_else(|| "no estimate".to_string());
                    println!("{category}: {eta}, confidence {confidence:.1}%");
                    println!("{narrative}");
                }
            }
        }
        Commands::Resolve { weeks, json } => {
            let resolved = resolutions.compute_weekly_resolutions(as_of).await?;
            let summary = resolutions.get_resolutions(weeks).await?;
            if json {
                return print_json(&summary);
            }
            println!(
                "Resolved {resolved} weeks. Global accuracy {:.1}%.",
                summary.global_accuracy
            );
            for week in &summary.weeks {
                println!(
                    "- {}: {:.1}% ({}/{})",
                    week.week, week.accuracy, week.hits, week.total
                );
            }
        }
        Commands::Report { out } => {
            let latest = scoring.get_latest_scores().await?;
            let alerts = scoring.get_recent_alerts(10).await?;
            let mut predictions = Vec::with_capacity(config.categories.len());
            for category in &config.categories {
                predictions.push(correlation.get_prediction(&category.id).await?);
            }
            let summary = resolutions.get_resolutions(12).await?;
            let report = report::build_report(
                as_of,
                &config.categories,
                &latest,
                &alerts,
                &predictions,
                &summary,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
