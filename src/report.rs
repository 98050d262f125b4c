use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::config::Category;
use crate::models::{Alert, CategoryScore, Color, Prediction, ResolutionSummary};

/// Registry order paired with each category's latest score, if it has one.
pub fn latest_by_category<'a>(
    categories: &'a [Category],
    latest: &'a [CategoryScore],
) -> Vec<(&'a Category, Option<&'a CategoryScore>)> {
    let by_id: HashMap<&str, &CategoryScore> =
        latest.iter().map(|s| (s.category.as_str(), s)).collect();
    categories
        .iter()
        .map(|c| (c, by_id.get(c.id.as_str()).copied()))
        .collect()
}

pub fn count_by_color(latest: &[CategoryScore]) -> Vec<(Color, usize)> {
    [Color::Green, Color::Yellow, Color::Red]
        .into_iter()
        .map(|color| (color, latest.iter().filter(|s| s.color == color).count()))
        .collect()
}

pub fn build_report(
    generated_on: NaiveDate,
    categories: &[Category],
    latest: &[CategoryScore],
    alerts: &[Alert],
    predictions: &[Prediction],
    resolutions: &ResolutionSummary,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Legislative Pulse Report");
    let _ = writeln!(output, "Generated on {generated_on}");
    let _ = writeln!(output);

    let _ = writeln!(output, "## Traffic Light");
    let mix: Vec<String> = count_by_color(latest)
        .iter()
        .map(|(color, count)| format!("{count} {color}"))
        .collect();
    let _ = writeln!(output, "{}", mix.join(", "));
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "| Category | Color | Total | Media | Trends | Legislative | Speech | Urgency | Date |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");

    let mut rows = latest_by_category(categories, latest);
    rows.sort_by(|(a, sa), (b, sb)| {
        let ta = sa.map(|s| s.score_total).unwrap_or(f64::NEG_INFINITY);
        let tb = sb.map(|s| s.score_total).unwrap_or(f64::NEG_INFINITY);
        tb.total_cmp(&ta).then_with(|| a.id.cmp(&b.id))
    });
    for (category, score) in rows {
        match score {
            Some(s) => {
                let _ = writeln!(
                    output,
                    "| {} | {} | {:.2} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} | {} |",
                    category.name,
                    s.color,
                    s.score_total,
                    s.score_media,
                    s.score_trends,
                    s.score_legislative,
                    s.score_speech,
                    s.score_urgency,
                    s.date
                );
            }
            None => {
                let _ = writeln!(output, "| {} | no data yet | | | | | | | |", category.name);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Alerts");

    if alerts.is_empty() {
        let _ = writeln!(output, "No alerts raised.");
    } else {
        for alert in alerts.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} [{}] {}",
                alert.timestamp.format("%Y-%m-%d %H:%M"),
                alert.kind,
                alert.message
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lag Outlook");

    let estimated: Vec<&Prediction> = predictions
        .iter()
        .filter(|p| matches!(p, Prediction::Estimated { .. }))
        .collect();
    if estimated.is_empty() {
        let _ = writeln!(output, "No correlation analysis stored yet.");
    } else {
        for prediction in estimated {
            if let Prediction::Estimated {
                category,
                confidence,
                estimated_days,
                narrative,
                ..
            } = prediction
            {
                let eta = estimated_days
                    .map(|d| format!("~{d} days"))
                    .unwrap_or_else(|| "no estimate".to_string());
                let _ = writeln!(
                    output,
                    "- {category}: {eta}, confidence {confidence:.1}%. {narrative}"
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Prediction Accuracy");

    if resolutions.weeks.is_empty() {
        let _ = writeln!(output, "No resolved weeks yet.");
    } else {
        let _ = writeln!(
            output,
            "Global accuracy {:.1}% over {} weeks",
            resolutions.global_accuracy,
            resolutions.weeks.len()
        );
        for week in &resolutions.weeks {
            let _ = writeln!(
                output,
                "- {} (from {}): {:.1}% ({}/{})",
                week.week, week.week_start, week.accuracy, week.hits, week.total
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(category: &str, total: f64, color: Color) -> CategoryScore {
        CategoryScore {
            category: category.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            score_total: total,
            score_media: 0.0,
            score_trends: 0.0,
            score_legislative: 0.0,
            score_speech: 0.0,
            score_urgency: 0.0,
            color,
            calendar_factor: 1.5,
        }
    }

    #[test]
    fn missing_categories_render_as_no_data_not_zero() {
        let categories = vec![
            Category::new("energy", "Energy", &["energy"]),
            Category::new("health", "Health", &["health"]),
        ];
        let latest = vec![score("energy", 0.0, Color::Red)];
        let report = build_report(
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            &categories,
            &latest,
            &[],
            &[],
            &ResolutionSummary {
                global_accuracy: 0.0,
                weeks: Vec::new(),
            },
        );

        assert!(report.contains("| Energy | red | 0.00 |"));
        assert!(report.contains("| Health | no data yet |"));
        assert!(report.contains("0 green, 0 yellow, 1 red"));
        assert!(report.contains("No alerts raised."));
        assert!(report.contains("No resolved weeks yet."));
    }

    #[test]
    fn colors_are_counted_per_tier() {
        let latest = vec![
            score("a", 80.0, Color::Green),
            score("b", 75.0, Color::Green),
            score("c", 10.0, Color::Red),
        ];
        assert_eq!(
            count_by_color(&latest),
            vec![(Color::Green, 2), (Color::Yellow, 0), (Color::Red, 1)]
        );
    }
}
