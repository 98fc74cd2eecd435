use super::types::{MetricSummary, RollingStats, Trend};

/// Mean/std/min/max over the finite values. `None` below `min_samples`.
pub fn rolling_stats(values: &[f64], min_samples: usize) -> Option<RollingStats> {
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() || valid.len() < min_samples {
        return None;
    }
    let summary = summarize(&valid)?;
    Some(RollingStats {
        mean: summary.mean,
        std: summary.std,
        min: summary.min,
        max: summary.max,
        count: valid.len(),
    })
}

/// Population statistics over the finite values; `None` if there are none.
pub fn summarize(values: &[f64]) -> Option<MetricSummary> {
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        return None;
    }
    let n = valid.len() as f64;
    let mean = valid.iter().sum::<f64>() / n;
    let variance = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
    let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(MetricSummary {
        mean,
        min,
        max,
        std: variance.sqrt(),
    })
}

/// Classifies `(time, value)` samples by the least-squares slope divided by
/// the peak-to-peak value range. Non-finite values are skipped first.
pub fn linear_trend(samples: &[(f64, f64)], threshold: f64, min_samples: usize) -> Trend {
    let valid: Vec<(f64, f64)> = samples
        .iter()
        .copied()
        .filter(|(t, v)| t.is_finite() && v.is_finite())
        .collect();
    if valid.is_empty() || valid.len() < min_samples {
        return Trend::Unknown;
    }

    let t0 = valid[0].0;
    let n = valid.len() as f64;
    let mean_t = valid.iter().map(|(t, _)| t - t0).sum::<f64>() / n;
    let mean_v = valid.iter().map(|(_, v)| v).sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut spread = 0.0;
    for (t, v) in &valid {
        let dt = (t - t0) - mean_t;
        covariance += dt * (v - mean_v);
        spread += dt * dt;
    }
    if spread == 0.0 {
        return Trend::Unknown;
    }
    let slope = covariance / spread;

    let (lo, hi) = valid
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| {
            (lo.min(*v), hi.max(*v))
        });
    let range = hi - lo;
    let normalized = if range > 0.0 { slope / range } else { 0.0 };

    if normalized > threshold {
        Trend::Increasing
    } else if normalized < -threshold {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// `|value - mean| / std`, or `None` for a flat signal.
pub fn z_score(value: f64, stats: &RollingStats) -> Option<f64> {
    if !value.is_finite() || !(stats.std > 0.0) {
        return None;
    }
    Some((value - stats.mean).abs() / stats.std)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<(f64, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (1_714_564_800.0 + i as f64, *v))
            .collect()
    }

    #[test]
    fn stats_need_min_samples() {
        assert!(rolling_stats(&[1.0, 2.0, 3.0, 4.0], 5).is_none());
        assert!(rolling_stats(&[1.0, 2.0, 3.0, 4.0, f64::NAN], 5).is_none());

        let stats = rolling_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 5).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std, 2.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.count, 8);
    }

    #[test]
    fn increasing_series_trends_up() {
        let values: Vec<f64> = (0..10).map(|i| 10_000.0 + 10.0 * i as f64).collect();
        assert_eq!(linear_trend(&series(&values), 0.1, 5), Trend::Increasing);

        let falling: Vec<f64> = values.iter().rev().copied().collect();
        assert_eq!(linear_trend(&series(&falling), 0.1, 5), Trend::Decreasing);
    }

    #[test]
    fn constant_series_is_stable() {
        assert_eq!(linear_trend(&series(&[250.0; 10]), 0.1, 5), Trend::Stable);
    }

    #[test]
    fn noisy_flat_series_is_stable() {
        let values = [250.0, 252.0, 249.0, 251.0, 250.0, 252.0, 249.0, 251.0];
        assert_eq!(linear_trend(&series(&values), 0.1, 5), Trend::Stable);
    }

    #[test]
    fn degenerate_regressions_are_unknown() {
        assert_eq!(linear_trend(&series(&[1.0, 2.0, 3.0]), 0.1, 5), Trend::Unknown);

        let same_instant: Vec<(f64, f64)> = (0..6).map(|i| (100.0, i as f64)).collect();
        assert_eq!(linear_trend(&same_instant, 0.1, 5), Trend::Unknown);
    }

    #[test]
    fn z_score_threshold_boundary() {
        let stats = RollingStats {
            mean: 1000.0,
            std: 10.0,
            min: 980.0,
            max: 1020.0,
            count: 10,
        };
        assert!(z_score(1026.0, &stats).unwrap() > 2.5);
        assert!(z_score(1024.0, &stats).unwrap() < 2.5);
        assert!(z_score(974.0, &stats).unwrap() > 2.5);

        let flat = RollingStats { std: 0.0, ..stats };
        assert_eq!(z_score(5000.0, &flat), None);
    }
}
