// src/drivers/beat.rs
use serde::{Deserialize, Serialize};
use crate::drivers::buffer::capacity_for;
use crate::drivers::filter::moving_average;
use crate::drivers::quality::median;
use crate::drivers::EngineError;
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Analysis window, newest samples only.
    pub window_seconds: f64,
    /// Moving-average length subtracted to remove drift.
    pub detrend_seconds: f64,
    /// Moving-average length used to suppress high-frequency noise.
    pub smooth_seconds: f64,
    pub z_threshold: f64,
    /// Minimum spacing between accepted peaks.
    pub refractory_seconds: f64,
    pub rr_min_seconds: f64,
    pub rr_max_seconds: f64,
    /// Minimum median z-score of accepted peaks.
    pub snr_min: f64,
}
impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            window_seconds: 15.0,
            detrend_seconds: 1.0,
            smooth_seconds: 0.12,
            z_threshold: 0.8,
            refractory_seconds: 0.4,
            rr_min_seconds: 0.35,
            rr_max_seconds: 1.5,
            snr_min: 1.0,
        }
    }
}
impl BeatConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = [
            ("beat.window_seconds", self.window_seconds),
            ("beat.detrend_seconds", self.detrend_seconds),
            ("beat.smooth_seconds", self.smooth_seconds),
            ("beat.refractory_seconds", self.refractory_seconds),
            ("beat.rr_min_seconds", self.rr_min_seconds),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(EngineError::invalid(name, format!("must be > 0, got {value}")));
            }
        }
        if !(self.rr_max_seconds > self.rr_min_seconds) {
            return Err(EngineError::invalid(
                "beat.rr_max_seconds",
                format!(
                    "must exceed rr_min_seconds ({} <= {})",
                    self.rr_max_seconds, self.rr_min_seconds
                ),
            ));
        }
        Ok(())
    }
}
/// One detected pulse peak.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    /// Peak time on the stream clock, seconds.
    pub timestamp_secs: f64,
    /// Interval to the previous peak.
    pub rr_secs: f64,
    pub bpm: f64,
}
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeartRate {
    pub bpm: f64,
    pub median_rr_secs: f64,
    /// Median z-score of the accepted peaks.
    pub snr: f64,
    pub peaks: usize,
}
/// Why a window did or did not yield a heart rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatStatus {
    Ok,
    InsufficientData,
    FlatSignal,
    TooFewPeaks,
    LowSnr,
    NoPlausibleIntervals,
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeatReport {
    pub status: BeatStatus,
    pub heart_rate: Option<HeartRate>,
    /// Beats not reported by any earlier call.
    pub new_beats: Vec<BeatEvent>,
}
impl BeatReport {
    fn unavailable(status: BeatStatus) -> Self {
        Self {
            status,
            heart_rate: None,
            new_beats: Vec::new(),
        }
    }
}
/// Pulse detection on a single optical (PPG-like) channel.
///
/// Each call looks at the newest `window_seconds` of the channel: trailing
/// moving-average detrend, short smoothing, z-score, thresholded local-maximum
/// picking with a refractory distance, then a median-peak-z quality gate and
/// physiological RR gating. A monotonic cursor keeps beats from being reported
/// twice across overlapping windows.
#[derive(Clone, Debug)]
pub struct BeatDetector {
    config: BeatConfig,
    last_peak_secs: Option<f64>,
}
impl BeatDetector {
    pub fn new(config: BeatConfig) -> Self {
        Self {
            config,
            last_peak_secs: None,
        }
    }
    /// Time of the newest peak already accounted for.
    pub fn last_peak_secs(&self) -> Option<f64> {
        self.last_peak_secs
    }
    /// Analyses `signal`, whose first sample was taken at `start_secs`.
    pub fn detect(&mut self, signal: &[f64], sample_rate_hz: f64, start_secs: f64) -> BeatReport {
        if !(sample_rate_hz > 0.0) {
            return BeatReport::unavailable(BeatStatus::InsufficientData);
        }
        let cfg = &self.config;
        let take = capacity_for(sample_rate_hz, cfg.window_seconds).min(signal.len());
        let skipped = signal.len() - take;
        let window = &signal[skipped..];
        let start_secs = start_secs + skipped as f64 / sample_rate_hz;
        let min_len = 10usize.max((2.0 * sample_rate_hz) as usize);
        if window.len() <= min_len {
            return BeatReport::unavailable(BeatStatus::InsufficientData);
        }
        let trend = moving_average(window, ((sample_rate_hz * cfg.detrend_seconds) as usize).max(1));
        let detrended: Vec<f64> = window.iter().zip(&trend).map(|(x, t)| x - t).collect();
        let smoothed = moving_average(
            &detrended,
            ((sample_rate_hz * cfg.smooth_seconds) as usize).max(1),
        );
        let n = smoothed.len() as f64;
        let mean = smoothed.iter().sum::<f64>() / n;
        let std = (smoothed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        if !std.is_finite() || std < 1e-9 {
            return BeatReport::unavailable(BeatStatus::FlatSignal);
        }
        let z: Vec<f64> = smoothed.iter().map(|v| (v - mean) / std).collect();
        let min_dist = ((cfg.refractory_seconds * sample_rate_hz) as usize).max(1);
        let mut peaks: Vec<usize> = Vec::new();
        for k in 1..z.len() - 1 {
            let is_peak = z[k] > cfg.z_threshold && z[k] > z[k - 1] && z[k] >= z[k + 1];
            if is_peak && peaks.last().map_or(true, |&p| k - p >= min_dist) {
                peaks.push(k);
            }
        }
        if peaks.len() < 2 {
            return BeatReport::unavailable(BeatStatus::TooFewPeaks);
        }
        let mut peak_z: Vec<f64> = peaks.iter().map(|&k| z[k]).collect();
        let snr = median(&mut peak_z).unwrap_or(0.0);
        if snr < cfg.snr_min {
            log::debug!("pulse window rejected: median peak z {snr:.2} < {}", cfg.snr_min);
            return BeatReport::unavailable(BeatStatus::LowSnr);
        }
        let times: Vec<f64> = peaks
            .iter()
            .map(|&k| start_secs + k as f64 / sample_rate_hz)
            .collect();
        let plausible = |rr: f64| rr > cfg.rr_min_seconds && rr < cfg.rr_max_seconds;
        let mut intervals: Vec<f64> = times
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|rr| plausible(*rr))
            .collect();
        let Some(median_rr) = median(&mut intervals) else {
            return BeatReport::unavailable(BeatStatus::NoPlausibleIntervals);
        };
        // A peak within one refractory period of the cursor is the same beat
        // seen again, possibly nudged by a sample.
        let cursor = self.last_peak_secs;
        let already_seen = |t: f64| cursor.is_some_and(|c| t <= c + cfg.refractory_seconds);
        let new_beats: Vec<BeatEvent> = times
            .windows(2)
            .filter_map(|w| {
                let rr = w[1] - w[0];
                (plausible(rr) && !already_seen(w[1])).then(|| BeatEvent {
                    timestamp_secs: w[1],
                    rr_secs: rr,
                    bpm: 60.0 / rr,
                })
            })
            .collect();
        if let Some(&newest) = times.last() {
            self.last_peak_secs = Some(cursor.map_or(newest, |c| c.max(newest)));
        }
        BeatReport {
            status: BeatStatus::Ok,
            heart_rate: Some(HeartRate {
                bpm: 60.0 / median_rr,
                median_rr_secs: median_rr,
                snr,
                peaks: peaks.len(),
            }),
            new_beats,
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::synth::pulse_train;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    fn ppg(len: usize, fs: f64, bpm: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.03).unwrap();
        pulse_train(len, fs, bpm, 0.05)
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let t = i as f64 / fs;
                1000.0 + 5.0 * v + 2.0 * (2.0 * std::f64::consts::PI * 0.1 * t).sin()
                    + noise.sample(&mut rng)
            })
            .collect()
    }
    #[test]
    fn recovers_72_bpm() {
        let fs = 50.0;
        let signal = ppg(15 * 50, fs, 72.0, 3);
        let mut detector = BeatDetector::new(BeatConfig::default());
        let report = detector.detect(&signal, fs, 0.0);
        assert_eq!(report.status, BeatStatus::Ok);
        let hr = report.heart_rate.unwrap();
        assert!((hr.bpm - 72.0).abs() <= 3.0, "bpm {}", hr.bpm);
        assert!(!report.new_beats.is_empty());
    }
    #[test]
    fn same_window_twice_emits_nothing_new() {
        let fs = 50.0;
        let signal = ppg(15 * 50, fs, 72.0, 5);
        let mut detector = BeatDetector::new(BeatConfig::default());
        assert_eq!(detector.last_peak_secs(), None);
        let first = detector.detect(&signal, fs, 100.0);
        assert!(!first.new_beats.is_empty());
        let cursor = detector.last_peak_secs().unwrap();
        let newest = first.new_beats.last().unwrap().timestamp_secs;
        assert!(cursor >= newest && cursor < 115.0);
        let second = detector.detect(&signal, fs, 100.0);
        assert!(second.heart_rate.is_some());
        assert!(second.new_beats.is_empty());
        assert_eq!(detector.last_peak_secs(), Some(cursor));
    }
    #[test]
    fn overlapping_windows_do_not_duplicate_beats() {
        let fs = 50.0;
        let signal = ppg(30 * 50, fs, 72.0, 9);
        let cfg = BeatConfig::default();
        let mut detector = BeatDetector::new(cfg.clone());
        let mut emitted: Vec<BeatEvent> = Vec::new();
        let window = 15 * 50;
        let mut end = window;
        while end <= signal.len() {
            let start = end - window;
            let report = detector.detect(&signal[start..end], fs, start as f64 / fs);
            emitted.extend(report.new_beats);
            end += 25;
        }
        for pair in emitted.windows(2) {
            assert!(pair[1].timestamp_secs - pair[0].timestamp_secs > cfg.refractory_seconds);
        }
        for beat in &emitted {
            assert!(beat.rr_secs > cfg.rr_min_seconds && beat.rr_secs < cfg.rr_max_seconds);
        }
        // roughly one beat per 0.833 s over the covered span
        assert!(emitted.len() >= 25 && emitted.len() <= 37, "{}", emitted.len());
    }
    #[test]
    fn flat_signal_has_no_rate() {
        let mut detector = BeatDetector::new(BeatConfig::default());
        let report = detector.detect(&vec![0.0; 750], 50.0, 0.0);
        assert_eq!(report.status, BeatStatus::FlatSignal);
        assert!(report.heart_rate.is_none());
    }
    #[test]
    fn short_window_is_insufficient() {
        let mut detector = BeatDetector::new(BeatConfig::default());
        let report = detector.detect(&[1.0, 2.0, 3.0], 50.0, 0.0);
        assert_eq!(report.status, BeatStatus::InsufficientData);
    }
    #[test]
    fn noise_fails_the_quality_gate() {
        let mut rng = StdRng::seed_from_u64(11);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let noise: Vec<f64> = (0..750).map(|_| normal.sample(&mut rng)).collect();
        let cfg = BeatConfig {
            snr_min: 2.5,
            ..BeatConfig::default()
        };
        let mut detector = BeatDetector::new(cfg);
        let report = detector.detect(&noise, 50.0, 0.0);
        assert!(report.heart_rate.is_none());
        assert!(report.new_beats.is_empty());
    }
    #[test]
    fn validation_rejects_inverted_rr_bounds() {
        let cfg = BeatConfig {
            rr_min_seconds: 1.5,
            rr_max_seconds: 0.35,
            ..BeatConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(BeatConfig::default().validate().is_ok());
    }
}
