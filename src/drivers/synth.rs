// src/drivers/synth.rs
use std::f64::consts::PI;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use rustfft::{num_complex::Complex64, FftPlanner};
/// Unit-variance noise whose PSD falls off as `1 / f^exponent`.
///
/// White noise is shaped in the frequency domain by `(m + 1)^(-exponent / 2)`
/// where `m` is the bin index, then transformed back and rescaled.
pub fn power_law_noise<R: Rng + ?Sized>(len: usize, exponent: f64, rng: &mut R) -> Vec<f64> {
    if len < 2 {
        return vec![0.0; len];
    }
    let mut spectrum: Vec<Complex64> = (0..len)
        .map(|_| Complex64::new(StandardNormal.sample(rng), 0.0))
        .collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(len).process(&mut spectrum);
    for (k, bin) in spectrum.iter_mut().enumerate() {
        let m = k.min(len - k) as f64;
        *bin *= (m + 1.0).powf(-exponent / 2.0);
    }
    planner.plan_fft_inverse(len).process(&mut spectrum);
    let values: Vec<f64> = spectrum.iter().map(|c| c.re).collect();
    let mean = values.iter().sum::<f64>() / len as f64;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len as f64).sqrt();
    if std <= f64::EPSILON {
        return vec![0.0; len];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}
pub fn sine(len: usize, sample_rate_hz: f64, freq_hz: f64, amplitude: f64) -> Vec<f64> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq_hz * i as f64 / sample_rate_hz).sin())
        .collect()
}
/// Gaussian pulses every `60 / bpm` seconds, `width_secs` standard deviation.
pub fn pulse_train(len: usize, sample_rate_hz: f64, bpm: f64, width_secs: f64) -> Vec<f64> {
    let period = 60.0 / bpm;
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate_hz;
            let phase = t.rem_euclid(period) - period / 2.0;
            (-phase * phase / (2.0 * width_secs * width_secs)).exp()
        })
        .collect()
}
#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    #[test]
    fn shaped_noise_is_standardized() {
        let mut rng = StdRng::seed_from_u64(1);
        let noise = power_law_noise(4096, 1.0, &mut rng);
        let mean = noise.iter().sum::<f64>() / noise.len() as f64;
        let var = noise.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / noise.len() as f64;
        assert!(mean.abs() < 1e-9);
        assert!((var - 1.0).abs() < 1e-9);
    }
    #[test]
    fn pulse_train_peaks_once_per_period() {
        let fs = 50.0;
        let train = pulse_train(500, fs, 60.0, 0.05);
        let peaks = (1..train.len() - 1)
            .filter(|&k| train[k] > train[k - 1] && train[k] >= train[k + 1])
            .count();
        assert_eq!(peaks, 10);
    }
}
