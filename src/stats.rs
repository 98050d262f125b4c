use std::collections::BTreeMap;

use chrono::NaiveDate;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use crate::models::DateWindow;

pub const STD_EPSILON: f64 = 1e-10;

/// Result of a statistical computation that may legitimately not apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    /// An input series carried no signal at all (all zeros).
    EmptySeries,
    InsufficientData { required: usize, available: usize },
    Degenerate(String),
}

impl<T> Outcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Outcome::Ok(_) => "ok".to_string(),
            Outcome::EmptySeries => "empty series".to_string(),
            Outcome::InsufficientData { required, available } => {
                format!("insufficient data ({available} of {required} points)")
            }
            Outcome::Degenerate(reason) => format!("degenerate: {reason}"),
        }
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn z_scores(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let std = population_std(values) + STD_EPSILON;
    values.iter().map(|v| (v - m) / std).collect()
}

pub fn is_all_zero(values: &[f64]) -> bool {
    values.iter().all(|v| *v == 0.0)
}

/// Pearson correlation; `None` when either side has no variance.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let mean_a = mean(a);
    let mean_b = mean(b);
    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        covariance += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    let r = covariance / (var_a.sqrt() * var_b.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

pub fn align_daily(series: &BTreeMap<NaiveDate, f64>, window: &DateWindow) -> Vec<f64> {
    window
        .dates()
        .map(|date| series.get(&date).copied().unwrap_or(0.0))
        .collect()
}

/// Ordinary least squares via the normal equations.
pub fn ols_ssr(design: &[Vec<f64>], response: &[f64]) -> Option<f64> {
    let rows = design.len();
    if rows == 0 || rows != response.len() {
        return None;
    }
    let k = design[0].len();
    if k == 0 || design.iter().any(|row| row.len() != k) {
        return None;
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, y) in design.iter().zip(response) {
        for i in 0..k {
            xty[i] += row[i] * y;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let beta = solve(xtx, xty)?;
    let ssr = design
        .iter()
        .zip(response)
        .map(|(row, y)| {
            let fitted: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
            (y - fitted).powi(2)
        })
        .sum::<f64>();
    ssr.is_finite().then_some(ssr)
}

fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = a
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(1.0_f64, f64::max);
    let tolerance = scale * 1e-10;

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if !a[pivot][col].is_finite() || a[pivot][col].abs() < tolerance {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Upper-tail probability of F(df1, df2) at `f`.
pub fn f_survival(f: f64, df1: f64, df2: f64) -> Option<f64> {
    if !f.is_finite() {
        return None;
    }
    let dist = FisherSnedecor::new(df1, df2).ok()?;
    Some(dist.sf(f.max(0.0)).clamp(0.0, 1.0))
}

/// Two-sided p-value of a Student-t statistic.
pub fn t_two_sided_p(t: f64, df: f64) -> Option<f64> {
    if !t.is_finite() {
        return None;
    }
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * dist.sf(t.abs())).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(48.499_9, 2), 48.5);
        assert_eq!(round_to(0.123_456_78, 4), 0.1235);
    }

    #[test]
    fn population_std_matches_hand_computation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_is_none_for_constant_series() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        let r = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn align_daily_zero_fills_missing_days() {
        let end = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let window = DateWindow::new(end, 4);
        let mut series = BTreeMap::new();
        series.insert(NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(), 3.0);
        series.insert(end, 5.0);
        series.insert(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), 99.0);

        assert_eq!(align_daily(&series, &window), vec![0.0, 3.0, 0.0, 5.0]);
    }

    #[test]
    fn ols_recovers_exact_line() {
        let design: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64]).collect();
        let response: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        let ssr = ols_ssr(&design, &response).unwrap();
        assert!(ssr < 1e-12);
    }

    #[test]
    fn ols_flags_collinear_design_as_singular() {
        let design: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![1.0, i as f64, 2.0 * i as f64])
            .collect();
        let response: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(ols_ssr(&design, &response), None);
    }

    #[test]
    fn tail_probabilities_are_sensible() {
        let p = t_two_sided_p(0.0, 20.0).unwrap();
        assert!((p - 1.0).abs() < 1e-9);
        let p = t_two_sided_p(2.086, 20.0).unwrap();
        assert!((p - 0.05).abs() < 1e-3);
        let p = f_survival(4.35, 1.0, 20.0).unwrap();
        assert!((p - 0.05).abs() < 2e-3);
        assert_eq!(f_survival(-1.0, 1.0, 20.0), Some(1.0));
    }
}
