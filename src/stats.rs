//! Small numeric helpers. Every function returns finite numbers and
//! treats an empty input as zero.

use crate::ir::{Regression, SeriesStatistics, TrendSummary};

/// Replace NaN/Infinity with 0.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    finite_or_zero((value * factor).round() / factor)
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn sum(values: &[f64]) -> f64 {
    finite_or_zero(values.iter().sum())
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    finite_or_zero(sum(values) / values.len() as f64)
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile(&sorted, 0.5)
}

/// Linear interpolation between closest ranks. `sorted_data` must be sorted.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    let n = sorted_data.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted_data[0];
    }

    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;

    if lower_idx == upper_idx {
        sorted_data[lower_idx]
    } else {
        let weight = rank - lower_idx as f64;
        sorted_data[lower_idx] * (1.0 - weight) + sorted_data[upper_idx] * weight
    }
}

pub fn describe(name: &str, values: &[f64]) -> SeriesStatistics {
    SeriesStatistics {
        name: name.to_string(),
        mean: mean(values),
        median: median(values),
        max: max(values),
        min: min(values),
        sum: sum(values),
    }
}

/// Least-squares fit `y = slope * x + intercept`.
///
/// With no points both are 0. With zero variance in x the slope is 0 and
/// the intercept is the mean of y.
pub fn least_squares(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return (0.0, 0.0);
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = mean(xs);
    let mean_y = mean(ys);

    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    if sxx == 0.0 || !sxx.is_finite() {
        return (0.0, mean_y);
    }
    let slope = finite_or_zero(sxy / sxx);
    let intercept = finite_or_zero(mean_y - slope * mean_x);
    (slope, intercept)
}

/// Pearson correlation in `[-1, 1]`; 0 with fewer than two points or when
/// either axis has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = mean(xs);
    let mean_y = mean(ys);

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return 0.0;
    }
    finite_or_zero(sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0)
}

/// Regression over (x, y) pairs. The fitted line is empty below two points.
pub fn regression(xs: &[f64], ys: &[f64]) -> Regression {
    if xs.len().min(ys.len()) < 2 {
        return Regression::default();
    }
    let (slope, intercept) = least_squares(xs, ys);
    Regression {
        slope,
        intercept,
        line: xs
            .iter()
            .map(|x| finite_or_zero(slope * x + intercept))
            .collect(),
    }
}

/// Trailing means over `window` values; only full windows are emitted.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| finite_or_zero(w.iter().sum::<f64>() / window as f64))
        .collect()
}

/// Trend over an ordered series, using the position as x.
pub fn trend(values: &[f64]) -> TrendSummary {
    let n = values.len();
    if n == 0 {
        return TrendSummary::default();
    }
    let index: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let (slope, intercept) = least_squares(&index, values);
    TrendSummary {
        slope,
        intercept,
        forecast_next: finite_or_zero(slope * n as f64 + intercept),
        moving_average: moving_average(values, n.min(3)),
    }
}

/// Share of `value` in `total` as a percentage; 0 when the total is 0.
pub fn percentage(value: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        finite_or_zero(value / total * 100.0)
    }
}
