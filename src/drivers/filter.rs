use std::f64::consts::PI;
use serde::{Deserialize, Serialize};
use crate::drivers::EngineError;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetrendMode {
    /// Subtract the window mean.
    Constant,
    /// Subtract the least-squares line.
    Linear,
}
/// One stage of the pre-analysis filter cascade.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    Detrend { mode: DetrendMode },
    /// Band-stop over `center_hz ± width_hz`.
    Notch {
        center_hz: f64,
        width_hz: f64,
        order: usize,
    },
    /// Butterworth band-pass; `order` applies to each edge.
    Bandpass {
        low_hz: f64,
        high_hz: f64,
        order: usize,
    },
}
impl FilterSpec {
    pub fn validate(&self, sample_rate_hz: f64) -> Result<(), EngineError> {
        let nyquist = sample_rate_hz / 2.0;
        match *self {
            FilterSpec::Detrend { .. } => Ok(()),
            FilterSpec::Notch {
                center_hz,
                width_hz,
                order,
            } => {
                if !(width_hz > 0.0) || !(center_hz > width_hz) {
                    return Err(EngineError::invalid(
                        "filters.notch",
                        format!("need 0 < width ({width_hz}) < center ({center_hz})"),
                    ));
                }
                if order == 0 {
                    return Err(EngineError::invalid("filters.notch.order", "must be at least 1"));
                }
                if center_hz + width_hz >= nyquist {
                    return Err(EngineError::AboveNyquist {
                        what: "notch filter".into(),
                        freq_hz: center_hz + width_hz,
                        nyquist_hz: nyquist,
                    });
                }
                Ok(())
            }
            FilterSpec::Bandpass {
                low_hz,
                high_hz,
                order,
            } => {
                if !(low_hz > 0.0) || !(high_hz > low_hz) {
                    return Err(EngineError::invalid(
                        "filters.bandpass",
                        format!("need 0 < low ({low_hz}) < high ({high_hz})"),
                    ));
                }
                if order == 0 {
                    return Err(EngineError::invalid("filters.bandpass.order", "must be at least 1"));
                }
                if high_hz >= nyquist {
                    return Err(EngineError::AboveNyquist {
                        what: "band-pass filter".into(),
                        freq_hz: high_hz,
                        nyquist_hz: nyquist,
                    });
                }
                Ok(())
            }
        }
    }
}
#[derive(Clone, Copy, Debug)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}
impl BiquadCoeffs {
    fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a1 + self.a2;
        if den.abs() < 1e-12 {
            0.0
        } else {
            (self.b0 + self.b1 + self.b2) / den
        }
    }
}
#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}
#[derive(Clone, Copy, Debug)]
struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}
impl BiquadFilter {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }
    /// Loads the state a constant `input` would have settled into.
    fn prime(&mut self, input: f64) -> f64 {
        let c = self.coeffs;
        let output = c.dc_gain() * input;
        self.state.z2 = c.b2 * input - c.a2 * output;
        self.state.z1 = c.b1 * input - c.a1 * output + self.state.z2;
        output
    }
    fn process(&mut self, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * y + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * y;
        y
    }
}
/// Ordered filter cascade applied to a buffer snapshot.
///
/// Every call starts from fresh filter state, so applying the chain to the
/// same window twice gives the same result.
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    sample_rate_hz: f64,
    specs: Vec<FilterSpec>,
}
impl FilterChain {
    pub fn new(sample_rate_hz: f64, specs: Vec<FilterSpec>) -> Self {
        Self {
            sample_rate_hz,
            specs,
        }
    }
    pub fn apply(&self, signal: &[f64]) -> Vec<f64> {
        apply(signal, self.sample_rate_hz, &self.specs)
    }
}
/// Runs `specs` in declaration order over a copy of `signal`.
pub fn apply(signal: &[f64], sample_rate_hz: f64, specs: &[FilterSpec]) -> Vec<f64> {
    let mut out = signal.to_vec();
    for spec in specs {
        out = match *spec {
            FilterSpec::Detrend { mode } => detrend(&out, mode),
            FilterSpec::Notch {
                center_hz,
                width_hz,
                order,
            } => run_iir(&out, order, |o| {
                let q = center_hz / (2.0 * width_hz);
                (0..(o / 2).max(1))
                    .map(|_| notch(center_hz, sample_rate_hz, q))
                    .collect()
            }),
            FilterSpec::Bandpass {
                low_hz,
                high_hz,
                order,
            } => run_iir(&out, order, |o| {
                let mut sections = butterworth_highpass(low_hz, sample_rate_hz, o);
                sections.extend(butterworth_lowpass(high_hz, sample_rate_hz, o));
                sections
            }),
        };
    }
    out
}
pub fn detrend(signal: &[f64], mode: DetrendMode) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    match mode {
        DetrendMode::Constant => signal.iter().map(|v| v - mean).collect(),
        DetrendMode::Linear => {
            let (slope, intercept) = line_fit(signal);
            signal
                .iter()
                .enumerate()
                .map(|(i, v)| v - (intercept + slope * i as f64))
                .collect()
        }
    }
}
/// Least-squares line through `(index, value)`; returns `(slope, intercept)`.
pub(crate) fn line_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.len() < 2 {
        return (0.0, values.first().copied().unwrap_or(0.0));
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, v) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (v - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    (slope, y_mean - slope * x_mean)
}
/// Samples needed to run a zero-phase pass of the given order.
fn min_samples(order: usize) -> usize {
    3 * (2 * order + 1)
}
fn run_iir(
    signal: &[f64],
    order: usize,
    design: impl Fn(usize) -> Vec<BiquadCoeffs>,
) -> Vec<f64> {
    let Some(order) = (1..=order).rev().find(|&o| signal.len() > min_samples(o)) else {
        log::debug!(
            "filter stage skipped: {} samples is too short for any order",
            signal.len()
        );
        return signal.to_vec();
    };
    filtfilt(&design(order), signal, min_samples(order))
}
/// Forward-backward pass with odd extension at both ends.
fn filtfilt(sections: &[BiquadCoeffs], signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let pad = pad.min(n - 1);
    let first = signal[0];
    let last = signal[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
    ext.extend_from_slice(signal);
    ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
    let forward = cascade(sections, &ext);
    let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
    reversed = cascade(sections, &reversed);
    reversed.reverse();
    reversed[pad..pad + n].to_vec()
}
fn cascade(sections: &[BiquadCoeffs], input: &[f64]) -> Vec<f64> {
    let mut filters: Vec<BiquadFilter> = sections.iter().copied().map(BiquadFilter::new).collect();
    let mut level = input.first().copied().unwrap_or(0.0);
    for f in &mut filters {
        level = f.prime(level);
    }
    input
        .iter()
        .map(|&x| filters.iter_mut().fold(x, |v, f| f.process(v)))
        .collect()
}
/// Pole-pair quality factors of an analog Butterworth prototype, plus
/// whether a real (first-order) pole remains.
fn butterworth_qs(order: usize) -> (Vec<f64>, bool) {
    let n = order as f64;
    if order % 2 == 0 {
        let qs = (1..=order / 2)
            .map(|k| 1.0 / (2.0 * ((2 * k - 1) as f64 * PI / (2.0 * n)).cos()))
            .collect();
        (qs, false)
    } else {
        let qs = (1..=(order - 1) / 2)
            .map(|k| 1.0 / (2.0 * (k as f64 * PI / n).cos()))
            .collect();
        (qs, true)
    }
}
fn butterworth_lowpass(cutoff_hz: f64, sample_rate_hz: f64, order: usize) -> Vec<BiquadCoeffs> {
    let (qs, real_pole) = butterworth_qs(order);
    let mut sections: Vec<BiquadCoeffs> = qs
        .into_iter()
        .map(|q| lowpass(cutoff_hz, sample_rate_hz, q))
        .collect();
    if real_pole {
        let k = (PI * cutoff_hz / sample_rate_hz).tan();
        let b0 = k / (k + 1.0);
        sections.push(BiquadCoeffs {
            b0,
            b1: b0,
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        });
    }
    sections
}
fn butterworth_highpass(cutoff_hz: f64, sample_rate_hz: f64, order: usize) -> Vec<BiquadCoeffs> {
    let (qs, real_pole) = butterworth_qs(order);
    let mut sections: Vec<BiquadCoeffs> = qs
        .into_iter()
        .map(|q| highpass(cutoff_hz, sample_rate_hz, q))
        .collect();
    if real_pole {
        let k = (PI * cutoff_hz / sample_rate_hz).tan();
        let b0 = 1.0 / (k + 1.0);
        sections.push(BiquadCoeffs {
            b0,
            b1: -b0,
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        });
    }
    sections
}
fn lowpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}
fn highpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 + cos_w0) * 0.5;
    let b1 = -(1.0 + cos_w0);
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}
fn notch(center_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * center_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = 1.0;
    let b1 = -2.0 * cos_w0;
    let b2 = 1.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}
fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> BiquadCoeffs {
    let a0_inv = 1.0 / a0;
    BiquadCoeffs {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}
/// Trailing moving average; the first `window - 1` outputs repeat the first
/// full average.
pub(crate) fn moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    let window = window.clamp(1, signal.len().max(1));
    if signal.len() < window || window == 1 {
        return signal.to_vec();
    }
    let mut out = Vec::with_capacity(signal.len());
    let mut sum: f64 = signal[..window].iter().sum();
    let first = sum / window as f64;
    out.extend(std::iter::repeat(first).take(window - 1));
    out.push(first);
    for i in window..signal.len() {
        sum += signal[i] - signal[i - window];
        out.push(sum / window as f64);
    }
    out
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::synth;
    fn rms(values: &[f64]) -> f64 {
        (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
    }
    #[test]
    fn apply_never_mutates_input() {
        let input = synth::sine(500, 250.0, 10.0, 1.0);
        let before = input.clone();
        let specs = [
            FilterSpec::Detrend {
                mode: DetrendMode::Linear,
            },
            FilterSpec::Notch {
                center_hz: 50.0,
                width_hz: 2.0,
                order: 4,
            },
            FilterSpec::Bandpass {
                low_hz: 1.0,
                high_hz: 30.0,
                order: 4,
            },
        ];
        let out = apply(&input, 250.0, &specs);
        assert_eq!(input, before);
        assert_eq!(out.len(), input.len());
    }
    #[test]
    fn bandpass_keeps_passband_and_rejects_stopband() {
        let fs = 250.0;
        let spec = [FilterSpec::Bandpass {
            low_hz: 1.0,
            high_hz: 30.0,
            order: 4,
        }];
        let pass = apply(&synth::sine(2000, fs, 10.0, 1.0), fs, &spec);
        let stop = apply(&synth::sine(2000, fs, 80.0, 1.0), fs, &spec);
        let pass_rms = rms(&pass[200..1800]);
        let stop_rms = rms(&stop[200..1800]);
        assert!((pass_rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.05, "{pass_rms}");
        assert!(stop_rms < 0.01, "{stop_rms}");
    }
    #[test]
    fn notch_removes_line_noise() {
        let fs = 250.0;
        let spec = [FilterSpec::Notch {
            center_hz: 60.0,
            width_hz: 2.0,
            order: 2,
        }];
        let out = apply(&synth::sine(2500, fs, 60.0, 1.0), fs, &spec);
        assert!(rms(&out[500..2000]) < 0.05);
        let kept = apply(&synth::sine(2500, fs, 10.0, 1.0), fs, &spec);
        assert!(rms(&kept[500..2000]) > 0.65);
    }
    #[test]
    fn short_windows_pass_through() {
        let input = vec![1.0, -1.0, 2.0, 0.5];
        let spec = [FilterSpec::Bandpass {
            low_hz: 1.0,
            high_hz: 30.0,
            order: 8,
        }];
        assert_eq!(apply(&input, 250.0, &spec), input);
        assert!(apply(&[], 250.0, &spec).is_empty());
    }
    #[test]
    fn order_is_clipped_for_medium_windows() {
        // 20 samples only fit order 2 (needs > 15).
        let input = synth::sine(20, 250.0, 10.0, 1.0);
        let spec = [FilterSpec::Bandpass {
            low_hz: 1.0,
            high_hz: 30.0,
            order: 8,
        }];
        let out = apply(&input, 250.0, &spec);
        assert_ne!(out, input);
        assert!(out.iter().all(|v| v.is_finite()));
    }
    #[test]
    fn linear_detrend_removes_ramp() {
        let ramp: Vec<f64> = (0..100).map(|i| 3.0 + 0.5 * i as f64).collect();
        let out = detrend(&ramp, DetrendMode::Linear);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
        let out = detrend(&ramp, DetrendMode::Constant);
        assert!(out.iter().sum::<f64>().abs() < 1e-9);
    }
    #[test]
    fn validation_rejects_edges_above_nyquist() {
        let spec = FilterSpec::Bandpass {
            low_hz: 1.0,
            high_hz: 40.0,
            order: 4,
        };
        assert!(spec.validate(250.0).is_ok());
        assert!(matches!(
            spec.validate(50.0),
            Err(EngineError::AboveNyquist { .. })
        ));
    }
    #[test]
    fn moving_average_pads_the_head() {
        let out = moving_average(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(out, vec![1.5, 1.5, 2.5, 3.5]);
    }
}
