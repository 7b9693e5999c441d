// src/drivers/quality.rs
use serde::{Deserialize, Serialize};
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Standard deviation below which a channel counts as flat.
    pub flat_std_epsilon: f64,
}
impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            flat_std_epsilon: 1e-9,
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalQuality {
    Good,
    Flat,
    NonFinite,
}
impl SignalQuality {
    pub fn is_usable(self) -> bool {
        self != SignalQuality::NonFinite
    }
}
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub rms: f64,
    /// Least-squares drift, units per second.
    pub slope_per_sec: f64,
}
impl ChannelStats {
    /// Statistics over `data`; all zero for an empty slice or any non-finite value.
    pub fn compute(data: &[f64], sample_rate_hz: f64) -> Self {
        if data.is_empty() || data.iter().any(|v| !v.is_finite()) {
            return Self::default();
        }
        let n = data.len() as f64;
        let (min, max) = data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let slope_per_sample = crate::drivers::filter::line_fit(data).0;
        Self {
            mean: data.iter().sum::<f64>() / n,
            std_dev: std_dev(data),
            min,
            max,
            rms: (data.iter().map(|v| v * v).sum::<f64>() / n).sqrt(),
            slope_per_sec: slope_per_sample * sample_rate_hz,
        }
    }
}
/// Coarse verdict for one window. Below `flat_std_epsilon` the channel reads
/// as disconnected or saturated; any NaN or infinity is rejected outright.
pub fn assess(data: &[f64], config: &QualityConfig) -> SignalQuality {
    if data.iter().any(|v| !v.is_finite()) {
        SignalQuality::NonFinite
    } else if std_dev(data) < config.flat_std_epsilon {
        SignalQuality::Flat
    } else {
        SignalQuality::Good
    }
}
/// Population standard deviation over the window.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().copied().sum::<f64>() / data.len() as f64;
    let variance = data
        .iter()
        .map(|v| {
            let delta = v - mean;
            delta * delta
        })
        .sum::<f64>()
        / data.len() as f64;
    variance.sqrt()
}
/// Median of `values`, reordering them in place. `None` when empty.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn std_dev_is_population_style() {
        let samples = [0.0, 2.0, -2.0, 0.0];
        assert!((std_dev(&samples) - 2.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(std_dev(&[]), 0.0);
    }
    #[test]
    fn stats_cover_range_rms_and_drift() {
        let fs = 10.0;
        let ramp: Vec<f64> = (0..50).map(|i| 1.0 + 0.5 * i as f64).collect();
        let stats = ChannelStats::compute(&ramp, fs);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 25.5);
        assert!((stats.slope_per_sec - 5.0).abs() < 1e-9);
        assert!(stats.rms > stats.mean);
    }
    #[test]
    fn quality_verdicts() {
        let cfg = QualityConfig::default();
        assert_eq!(assess(&[0.0; 100], &cfg), SignalQuality::Flat);
        assert_eq!(assess(&[1.0, -1.0, 1.0], &cfg), SignalQuality::Good);
        assert_eq!(assess(&[1.0, f64::NAN], &cfg), SignalQuality::NonFinite);
        assert!(!SignalQuality::NonFinite.is_usable());
        assert!(SignalQuality::Flat.is_usable());
    }
    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }
}
