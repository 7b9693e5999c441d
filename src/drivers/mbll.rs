// src/drivers/mbll.rs
use serde::{Deserialize, Serialize};
use crate::drivers::filter::line_fit;
use crate::drivers::quality::{median, std_dev};
const EPS: f64 = 1e-9;
/// Fewest paired samples a conversion is attempted with.
pub const MIN_SAMPLES: usize = 5;
/// Which channels carry the red and infrared intensities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpticalPair {
    pub red_channel: String,
    pub ir_channel: String,
}
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HemoglobinTrace {
    pub delta_hbo: Vec<f64>,
    pub delta_hbr: Vec<f64>,
}
/// Window summary of the relative changes. Slopes are per second.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hemodynamics {
    pub hbo_mean: f64,
    pub hbo_std: f64,
    pub hbo_slope: f64,
    pub hbr_mean: f64,
    pub hbr_std: f64,
    pub hbr_slope: f64,
}
/// Converts paired intensities to relative oxy / deoxy changes with a
/// simplified modified Beer-Lambert law. No extinction coefficients are
/// applied, so the outputs are unitless trends rather than concentrations.
///
/// The baseline intensity is the median of the first `max(10, min(n/5, 500))`
/// samples. Returns `None` for fewer than [`MIN_SAMPLES`] pairs or any
/// non-finite input.
pub fn relative_hemoglobin(red: &[f64], ir: &[f64]) -> Option<HemoglobinTrace> {
    let n = red.len().min(ir.len());
    if n < MIN_SAMPLES {
        return None;
    }
    let red = shift_positive(&red[red.len() - n..])?;
    let ir = shift_positive(&ir[ir.len() - n..])?;
    let base_n = 10usize.max((n / 5).min(500)).min(n);
    let red0 = median(&mut red[..base_n].to_vec())?;
    let ir0 = median(&mut ir[..base_n].to_vec())?;
    let (delta_hbo, delta_hbr) = red
        .iter()
        .zip(&ir)
        .map(|(r, i)| {
            let od_red = -((r + EPS) / (red0 + EPS)).ln();
            let od_ir = -((i + EPS) / (ir0 + EPS)).ln();
            (od_ir - 0.5 * od_red, od_red - 0.5 * od_ir)
        })
        .unzip();
    Some(HemoglobinTrace {
        delta_hbo,
        delta_hbr,
    })
}
/// Window summary of [`relative_hemoglobin`]: mean, spread and linear trend.
pub fn summarize(red: &[f64], ir: &[f64], sample_rate_hz: f64) -> Option<Hemodynamics> {
    let trace = relative_hemoglobin(red, ir)?;
    let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
    let slope = |v: &[f64]| line_fit(v).0 * sample_rate_hz;
    Some(Hemodynamics {
        hbo_mean: mean(&trace.delta_hbo),
        hbo_std: std_dev(&trace.delta_hbo),
        hbo_slope: slope(&trace.delta_hbo),
        hbr_mean: mean(&trace.delta_hbr),
        hbr_std: std_dev(&trace.delta_hbr),
        hbr_slope: slope(&trace.delta_hbr),
    })
}
fn shift_positive(values: &[f64]) -> Option<Vec<f64>> {
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if min <= 0.0 {
        Some(values.iter().map(|v| v - min + EPS).collect())
    } else {
        Some(values.to_vec())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn constant_intensity_means_no_change() {
        let red = vec![5000.0; 100];
        let ir = vec![8000.0; 100];
        let summary = summarize(&red, &ir, 50.0).unwrap();
        assert!(summary.hbo_mean.abs() < 1e-12);
        assert!(summary.hbr_mean.abs() < 1e-12);
        assert!(summary.hbo_std.abs() < 1e-12);
        assert!(summary.hbo_slope.abs() < 1e-12);
        assert!(summary.hbr_slope.abs() < 1e-12);
    }
    #[test]
    fn slopes_follow_a_steady_trend() {
        let fs = 10.0;
        let red = vec![5000.0; 200];
        // infrared optical density rises by 0.01 per second
        let ir: Vec<f64> = (0..200).map(|i| 8000.0 * (-0.01 * i as f64 / fs).exp()).collect();
        let summary = summarize(&red, &ir, fs).unwrap();
        assert!((summary.hbo_slope - 0.01).abs() < 1e-9, "hbo {}", summary.hbo_slope);
        assert!((summary.hbr_slope + 0.005).abs() < 1e-9, "hbr {}", summary.hbr_slope);
        // the same samples read at twice the rate trend twice as fast
        let doubled = summarize(&red, &ir, 2.0 * fs).unwrap();
        assert!((doubled.hbo_slope - 0.02).abs() < 1e-9);
        let falling: Vec<f64> = ir.iter().rev().copied().collect();
        assert!(summarize(&red, &falling, fs).unwrap().hbo_slope < 0.0);
    }
    #[test]
    fn falling_infrared_reads_as_oxygenation() {
        let red = vec![5000.0; 100];
        let ir: Vec<f64> = (0..100).map(|i| if i < 50 { 8000.0 } else { 7000.0 }).collect();
        let trace = relative_hemoglobin(&red, &ir).unwrap();
        let last = trace.delta_hbo.len() - 1;
        assert!(trace.delta_hbo[last] > 0.0);
        assert!(trace.delta_hbr[last] < 0.0);
        assert!((trace.delta_hbo[last] + (7000.0f64 / 8000.0).ln()).abs() < 1e-6);
    }
    #[test]
    fn too_few_samples_or_bad_values() {
        assert!(summarize(&[1.0; 4], &[1.0; 4], 50.0).is_none());
        let mut ir = vec![1.0; 20];
        ir[3] = f64::NAN;
        assert!(summarize(&[1.0; 20], &ir, 50.0).is_none());
    }
    #[test]
    fn non_positive_input_is_shifted() {
        let red: Vec<f64> = (0..20).map(|i| i as f64 - 10.0).collect();
        let ir = vec![0.0; 20];
        let trace = relative_hemoglobin(&red, &ir).unwrap();
        assert!(trace.delta_hbo.iter().all(|v| v.is_finite()));
    }
}
