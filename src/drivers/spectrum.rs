// src/drivers/spectrum.rs
use once_cell::sync::Lazy;
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
/// Power spectral density in `signal² / Hz`; `frequencies_hz` ascending, same
/// length as `power`.
///
/// An empty estimate means there was not enough data to compute one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PsdEstimate {
    pub frequencies_hz: Vec<f64>,
    pub power: Vec<f64>,
}
impl PsdEstimate {
    pub fn empty() -> Self {
        Self::default()
    }
    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }
    pub fn len(&self) -> usize {
        self.power.len()
    }
    /// Bin spacing in Hz, or 0.0 for fewer than two bins.
    pub fn resolution_hz(&self) -> f64 {
        match self.frequencies_hz.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }
    /// Frequency of the strongest bin, ignoring DC.
    pub fn peak_frequency(&self) -> Option<f64> {
        self.bins()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(f, _)| f)
    }
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies_hz
            .iter()
            .copied()
            .zip(self.power.iter().copied())
    }
    pub fn total_power(&self) -> f64 {
        self.power.iter().sum()
    }
}
/// Welch estimate with segments of `min(segment_seconds * fs, len)` samples.
///
/// Returns an empty estimate when that segment is shorter than `min_samples`.
pub fn welch(
    signal: &[f64],
    sample_rate_hz: f64,
    segment_seconds: f64,
    min_samples: usize,
) -> PsdEstimate {
    let nperseg = ((segment_seconds * sample_rate_hz).round() as usize).min(signal.len());
    if nperseg < min_samples.max(2) {
        return PsdEstimate::empty();
    }
    let step = nperseg - nperseg / 2;
    let window = hann_periodic(nperseg);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let fft = FftPlanner::<f64>::new().plan_fft_forward(nperseg);
    let n_bins = nperseg / 2 + 1;
    let mut accum = vec![0.0; n_bins];
    let mut segments = 0usize;
    let mut buffer = vec![Complex64::new(0.0, 0.0); nperseg];
    let mut start = 0;
    while start + nperseg <= signal.len() {
        let segment = &signal[start..start + nperseg];
        let mean = segment.iter().sum::<f64>() / nperseg as f64;
        for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&window) {
            *slot = Complex64::new((x - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (acc, c) in accum.iter_mut().zip(&buffer) {
            *acc += c.norm_sqr();
        }
        segments += 1;
        start += step;
    }
    let scale = 1.0 / (sample_rate_hz * window_power * segments as f64);
    let nyquist_bin = (nperseg % 2 == 0).then_some(nperseg / 2);
    let power = accum
        .iter()
        .enumerate()
        .map(|(k, p)| {
            let one_sided = if k == 0 || Some(k) == nyquist_bin { 1.0 } else { 2.0 };
            p * scale * one_sided
        })
        .collect();
    let frequencies_hz = (0..n_bins)
        .map(|k| k as f64 * sample_rate_hz / nperseg as f64)
        .collect();
    PsdEstimate {
        frequencies_hz,
        power,
    }
}
fn hann_periodic(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos())
        .collect()
}
/// Named frequency range; inclusive at both ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub name: String,
    pub low_hz: f64,
    pub high_hz: f64,
}
impl FrequencyBand {
    pub fn new(name: impl Into<String>, low_hz: f64, high_hz: f64) -> Self {
        Self {
            name: name.into(),
            low_hz,
            high_hz,
        }
    }
}
/// Classic EEG bands, gamma capped below the 50 Hz mains line.
pub static EEG_BANDS: Lazy<Vec<FrequencyBand>> = Lazy::new(|| {
    vec![
        FrequencyBand::new("delta", 1.0, 4.0),
        FrequencyBand::new("theta", 4.0, 8.0),
        FrequencyBand::new("alpha", 8.0, 13.0),
        FrequencyBand::new("beta", 13.0, 30.0),
        FrequencyBand::new("gamma", 30.0, 45.0),
    ]
});
/// Mean PSD within `[low_hz, high_hz]`, or 0.0 when no bin falls inside.
pub fn band_power(psd: &PsdEstimate, low_hz: f64, high_hz: f64) -> f64 {
    let (sum, count) = psd
        .bins()
        .filter(|(f, _)| *f >= low_hz && *f <= high_hz)
        .fold((0.0, 0usize), |(s, c), (_, p)| (s + p, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
/// Band name to power, in band-table order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPowers {
    pub entries: Vec<(String, f64)>,
}
impl BandPowers {
    pub fn get(&self, band: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == band)
            .map(|(_, p)| *p)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, p)| (name.as_str(), *p))
    }
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// Name of the strongest band among `candidates` (all bands when empty).
    pub fn strongest(&self, candidates: &[&str]) -> Option<&str> {
        self.iter()
            .filter(|(name, _)| candidates.is_empty() || candidates.contains(name))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| name)
    }
    /// Each value divided by the total; uniform when the total is ~0.
    pub fn normalized(&self) -> BandPowers {
        let total = self.total();
        let n = self.entries.len().max(1) as f64;
        let entries = self
            .entries
            .iter()
            .map(|(name, p)| {
                let share = if total > f64::EPSILON { p / total } else { 1.0 / n };
                (name.clone(), share)
            })
            .collect();
        BandPowers { entries }
    }
}
pub fn band_powers(psd: &PsdEstimate, bands: &[FrequencyBand], normalize: bool) -> BandPowers {
    let powers = BandPowers {
        entries: bands
            .iter()
            .map(|b| (b.name.clone(), band_power(psd, b.low_hz, b.high_hz)))
            .collect(),
    };
    if normalize {
        powers.normalized()
    } else {
        powers
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectralPeak {
    pub frequency_hz: f64,
    pub power: f64,
}
/// Local PSD maxima at or above `min_relative_height * max`, strongest first.
pub fn dominant_frequencies(
    psd: &PsdEstimate,
    max_peaks: usize,
    min_relative_height: f64,
) -> Vec<SpectralPeak> {
    let p = &psd.power;
    if p.len() < 3 {
        return Vec::new();
    }
    let floor = p.iter().copied().fold(0.0, f64::max) * min_relative_height;
    let mut peaks: Vec<SpectralPeak> = (1..p.len() - 1)
        .filter(|&k| p[k] > p[k - 1] && p[k] >= p[k + 1] && p[k] > 0.0 && p[k] >= floor)
        .map(|k| SpectralPeak {
            frequency_hz: psd.frequencies_hz[k],
            power: p[k],
        })
        .collect();
    peaks.sort_by(|a, b| b.power.total_cmp(&a.power));
    peaks.truncate(max_peaks);
    peaks
}
/// How strongly `band` dominates its neighbours, in `[0, 1]`.
///
/// Relative power of the band times the geometric mean of its ratios to each
/// neighbour, halved and clipped. Zero if any neighbour has no power.
pub fn dominance_score(powers: &BandPowers, band: &str, neighbors: &[String]) -> f64 {
    let total = powers.total();
    let Some(target) = powers.get(band) else {
        return 0.0;
    };
    if total <= 0.0 || neighbors.is_empty() {
        return 0.0;
    }
    let mut log_ratio_sum = 0.0;
    for neighbor in neighbors {
        match powers.get(neighbor) {
            Some(p) if p > 0.0 && target > 0.0 => log_ratio_sum += (target / p).ln(),
            _ => return 0.0,
        }
    }
    let neighbor_ratio = (log_ratio_sum / neighbors.len() as f64).exp();
    ((target / total) * neighbor_ratio / 2.0).min(1.0)
}
