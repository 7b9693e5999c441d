// src/types.rs
use serde::{Deserialize, Serialize};
use crate::drivers::spectrum::SpectralPeak;
use crate::drivers::{
    BandPowers, BeatEvent, BeatStatus, ChannelStats, Hemodynamics, HeartRate, NoiseColor,
    PowerLawFit, PsdEstimate, SignalQuality,
};
/// Everything computed for one channel on one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelAnalysis {
    pub name: String,
    pub quality: SignalQuality,
    pub stats: ChannelStats,
    /// Filtered copy of the window the spectrum was computed from.
    pub filtered: Vec<f64>,
    pub psd: PsdEstimate,
    pub fit: Option<PowerLawFit>,
    pub noise_color: Option<NoiseColor>,
    /// Observed over fitted power in the prominence band.
    pub prominence: Option<f64>,
    /// Empty while the window is too short for a PSD.
    pub band_powers: BandPowers,
    pub relative_band_powers: BandPowers,
    /// Baselines after this tick's update.
    pub baselines: BandPowers,
    /// Bands above `ratio_threshold` times their previous baseline.
    pub elevated: Vec<String>,
    /// Target band elevated and stronger than every neighbour band.
    pub burst: bool,
    /// Target band dominance in `[0, 1]`; `None` without a PSD.
    pub dominance: Option<f64>,
    pub dominant_frequencies: Vec<SpectralPeak>,
    /// `None` for channels that are not pulse channels.
    pub beat_status: Option<BeatStatus>,
    pub heart_rate: Option<HeartRate>,
    pub new_beats: Vec<BeatEvent>,
    /// Why the channel could not be analysed this tick.
    pub error: Option<String>,
}
impl ChannelAnalysis {
    /// Placeholder for a channel whose processing failed.
    pub fn unavailable(name: impl Into<String>, quality: SignalQuality, error: String) -> Self {
        Self {
            name: name.into(),
            quality,
            stats: ChannelStats::default(),
            filtered: Vec::new(),
            psd: PsdEstimate::empty(),
            fit: None,
            noise_color: None,
            prominence: None,
            band_powers: BandPowers::default(),
            relative_band_powers: BandPowers::default(),
            baselines: BandPowers::default(),
            elevated: Vec::new(),
            burst: false,
            dominance: None,
            dominant_frequencies: Vec::new(),
            beat_status: None,
            heart_rate: None,
            new_beats: Vec::new(),
            error: Some(error),
        }
    }
    pub fn is_available(&self) -> bool {
        self.error.is_none()
    }
}
/// Immutable result of one engine tick, shared with consumers behind an `Arc`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub tick: u64,
    /// Stream clock at the time of the tick.
    pub stream_secs: f64,
    pub channels: Vec<ChannelAnalysis>,
    pub hemodynamics: Option<Hemodynamics>,
}
impl AnalysisSnapshot {
    pub fn channel(&self, name: &str) -> Option<&ChannelAnalysis> {
        self.channels.iter().find(|c| c.name == name)
    }
    /// Beats first reported on this tick, across all channels.
    pub fn new_beats(&self) -> impl Iterator<Item = (&str, &BeatEvent)> {
        self.channels
            .iter()
            .flat_map(|c| c.new_beats.iter().map(move |b| (c.name.as_str(), b)))
    }
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
/// Entry of the engine's append-only beat log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggedBeat {
    pub channel: String,
    pub beat: BeatEvent,
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn unavailable_channel_is_empty_and_serializes() {
        let channel = ChannelAnalysis::unavailable("O1", SignalQuality::NonFinite, "nan".into());
        assert!(!channel.is_available());
        assert!(channel.psd.is_empty());
        let snapshot = AnalysisSnapshot {
            tick: 3,
            stream_secs: 1.5,
            channels: vec![channel],
            hemodynamics: None,
        };
        assert!(snapshot.channel("O1").is_some());
        assert!(snapshot.channel("O2").is_none());
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"non_finite\""));
    }
}
