// src/config.rs
use std::collections::HashSet;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::drivers::spectrum::EEG_BANDS;
use crate::drivers::{
    BeatConfig, DetrendMode, EngineError, FilterSpec, FrequencyBand, OpticalPair, QualityConfig,
};
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Welch segment length; shortened to the window when longer.
    pub segment_seconds: f64,
    /// Below this many samples per segment no PSD is produced.
    pub min_samples: usize,
    /// Frequency range the 1/f line is fitted over.
    pub fit_range_hz: (f64, f64),
    /// Sub-band compared against the fitted line.
    pub prominence_band_hz: (f64, f64),
    pub max_peaks: usize,
    /// Peaks below this fraction of the strongest bin are ignored.
    pub min_peak_height: f64,
}
impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            segment_seconds: 2.0,
            min_samples: 32,
            fit_range_hz: (1.0, 40.0),
            prominence_band_hz: (8.0, 13.0),
            max_peaks: 3,
            min_peak_height: 0.1,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Weight kept from the previous baseline on every tick.
    pub decay: f64,
    /// Band watched for bursts.
    pub target_band: String,
    /// Bands the target must dominate for a burst.
    pub neighbor_bands: Vec<String>,
    pub ratio_threshold: f64,
    pub epsilon: f64,
    /// Minimum spacing between two burst announcements on one channel.
    pub flag_cooldown_seconds: f64,
}
impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            decay: 0.9,
            target_band: "alpha".to_string(),
            neighbor_bands: vec!["theta".to_string(), "beta".to_string()],
            ratio_threshold: 1.5,
            epsilon: 1e-9,
            flag_cooldown_seconds: 3.0,
        }
    }
}
/// Engine configuration, built from a preset or loaded from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate_hz: f64,
    /// Ring buffer length per channel.
    pub window_seconds: f64,
    pub channels: Vec<String>,
    /// Channels the beat detector runs on.
    pub pulse_channels: Vec<String>,
    /// Applied in order before spectral analysis.
    pub filters: Vec<FilterSpec>,
    pub spectral: SpectralConfig,
    pub bands: Vec<FrequencyBand>,
    pub baseline: BaselineConfig,
    pub beat: BeatConfig,
    pub quality: QualityConfig,
    /// Red / infrared pair for relative haemoglobin, if any.
    pub optical_pair: Option<OpticalPair>,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self::eeg(["T3", "T4", "O1", "O2"])
    }
}
impl EngineConfig {
    /// Four-second EEG windows at 250 Hz with a mains notch and a 1-45 Hz band-pass.
    pub fn eeg<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sample_rate_hz: 250.0,
            window_seconds: 4.0,
            channels: channels.into_iter().map(Into::into).collect(),
            pulse_channels: Vec::new(),
            filters: vec![
                FilterSpec::Detrend {
                    mode: DetrendMode::Linear,
                },
                FilterSpec::Notch {
                    center_hz: 50.0,
                    width_hz: 2.0,
                    order: 2,
                },
                FilterSpec::Bandpass {
                    low_hz: 1.0,
                    high_hz: 45.0,
                    order: 4,
                },
            ],
            spectral: SpectralConfig::default(),
            bands: EEG_BANDS.clone(),
            baseline: BaselineConfig::default(),
            beat: BeatConfig::default(),
            quality: QualityConfig::default(),
            optical_pair: None,
        }
    }
    /// Fifteen-second optical windows at 50 Hz; beats are detected on `ir`.
    pub fn pulse(red: impl Into<String>, ir: impl Into<String>) -> Self {
        let red = red.into();
        let ir = ir.into();
        Self {
            sample_rate_hz: 50.0,
            window_seconds: 15.0,
            channels: vec![red.clone(), ir.clone()],
            pulse_channels: vec![ir.clone()],
            filters: vec![FilterSpec::Detrend {
                mode: DetrendMode::Linear,
            }],
            spectral: SpectralConfig {
                segment_seconds: 8.0,
                min_samples: 32,
                fit_range_hz: (0.1, 10.0),
                prominence_band_hz: (0.7, 3.0),
                max_peaks: 3,
                min_peak_height: 0.1,
            },
            bands: vec![
                FrequencyBand::new("mayer", 0.05, 0.15),
                FrequencyBand::new("respiration", 0.15, 0.5),
                FrequencyBand::new("cardiac", 0.7, 3.0),
            ],
            baseline: BaselineConfig {
                target_band: "cardiac".to_string(),
                neighbor_bands: vec!["respiration".to_string()],
                ..BaselineConfig::default()
            },
            beat: BeatConfig {
                window_seconds: 15.0,
                ..BeatConfig::default()
            },
            quality: QualityConfig::default(),
            optical_pair: Some(OpticalPair {
                red_channel: red,
                ir_channel: ir,
            }),
        }
    }
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate_hz / 2.0
    }
    /// Checks every section; the first problem found is returned.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(EngineError::InvalidSampleRate);
        }
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            return Err(EngineError::InvalidWindow);
        }
        if self.channels.is_empty() {
            return Err(EngineError::NoChannels);
        }
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.as_str()) {
                return Err(EngineError::DuplicateChannel(channel.clone()));
            }
        }
        let known = |name: &str| -> Result<(), EngineError> {
            if seen.contains(name) {
                Ok(())
            } else {
                Err(EngineError::UnknownChannel(name.to_string()))
            }
        };
        for channel in &self.pulse_channels {
            known(channel)?;
        }
        if let Some(pair) = &self.optical_pair {
            known(&pair.red_channel)?;
            known(&pair.ir_channel)?;
        }
        for spec in &self.filters {
            spec.validate(self.sample_rate_hz)?;
        }
        self.validate_spectral()?;
        self.validate_bands()?;
        self.validate_baseline()?;
        self.beat.validate()?;
        if !(self.quality.flat_std_epsilon >= 0.0) {
            return Err(EngineError::invalid(
                "quality.flat_std_epsilon",
                "must be non-negative",
            ));
        }
        Ok(())
    }
    fn validate_spectral(&self) -> Result<(), EngineError> {
        let spectral = &self.spectral;
        if !(spectral.segment_seconds > 0.0) {
            return Err(EngineError::invalid(
                "spectral.segment_seconds",
                format!("must be > 0, got {}", spectral.segment_seconds),
            ));
        }
        if spectral.min_samples < 2 {
            return Err(EngineError::invalid("spectral.min_samples", "must be at least 2"));
        }
        if !(0.0..=1.0).contains(&spectral.min_peak_height) {
            return Err(EngineError::invalid(
                "spectral.min_peak_height",
                "must lie in [0, 1]",
            ));
        }
        self.check_range("spectral.fit_range_hz", spectral.fit_range_hz)?;
        self.check_range("spectral.prominence_band_hz", spectral.prominence_band_hz)
    }
    fn validate_bands(&self) -> Result<(), EngineError> {
        for band in &self.bands {
            if !(band.low_hz >= 0.0 && band.high_hz > band.low_hz) {
                return Err(EngineError::InvalidBand {
                    name: band.name.clone(),
                    low_hz: band.low_hz,
                    high_hz: band.high_hz,
                });
            }
            if band.high_hz > self.nyquist_hz() {
                return Err(EngineError::AboveNyquist {
                    what: format!("band `{}`", band.name),
                    freq_hz: band.high_hz,
                    nyquist_hz: self.nyquist_hz(),
                });
            }
        }
        Ok(())
    }
    fn validate_baseline(&self) -> Result<(), EngineError> {
        let baseline = &self.baseline;
        if !(0.0..=1.0).contains(&baseline.decay) {
            return Err(EngineError::invalid(
                "baseline.decay",
                format!("must lie in [0, 1], got {}", baseline.decay),
            ));
        }
        if !(baseline.ratio_threshold > 0.0) || !(baseline.epsilon > 0.0) {
            return Err(EngineError::invalid(
                "baseline.ratio_threshold",
                "ratio threshold and epsilon must be > 0",
            ));
        }
        if !(baseline.flag_cooldown_seconds >= 0.0) {
            return Err(EngineError::invalid(
                "baseline.flag_cooldown_seconds",
                "must be non-negative",
            ));
        }
        let band_names: HashSet<&str> = self.bands.iter().map(|b| b.name.as_str()).collect();
        let wanted = std::iter::once(&baseline.target_band).chain(&baseline.neighbor_bands);
        for name in wanted {
            if !band_names.contains(name.as_str()) {
                return Err(EngineError::invalid(
                    "baseline",
                    format!("band `{name}` is not in the band table"),
                ));
            }
        }
        Ok(())
    }
    fn check_range(&self, what: &'static str, (low, high): (f64, f64)) -> Result<(), EngineError> {
        if !(low >= 0.0 && high > low) {
            return Err(EngineError::invalid(what, format!("empty range {low}..{high} Hz")));
        }
        if high > self.nyquist_hz() {
            return Err(EngineError::AboveNyquist {
                what: what.to_string(),
                freq_hz: high,
                nyquist_hz: self.nyquist_hz(),
            });
        }
        Ok(())
    }
}
