use serde::{Deserialize, Serialize};
use crate::drivers::spectrum::PsdEstimate;
/// Fewest in-range bins a fit is attempted with.
pub const MIN_FIT_POINTS: usize = 5;
/// Straight line through the PSD in log10-log10 space.
///
/// `slope` is the aperiodic exponent with its sign kept: more negative means a
/// steeper fall-off.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerLawFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub range_hz: (f64, f64),
    pub points: usize,
}
impl PowerLawFit {
    /// `10^intercept * f^slope`
    pub fn predict(&self, frequency_hz: f64) -> f64 {
        10f64.powf(self.intercept) * frequency_hz.powf(self.slope)
    }
    /// Fitted curve over the in-range frequencies, for display.
    pub fn curve(&self, frequencies_hz: &[f64]) -> Vec<(f64, f64)> {
        frequencies_hz
            .iter()
            .copied()
            .filter(|f| *f > 0.0 && *f >= self.range_hz.0 && *f <= self.range_hz.1)
            .map(|f| (f, self.predict(f)))
            .collect()
    }
}
/// Ordinary least squares on `log10(psd)` against `log10(f)` for bins with
/// `f` in `range_hz` and positive power. `None` below [`MIN_FIT_POINTS`].
pub fn fit(frequencies_hz: &[f64], psd: &[f64], range_hz: (f64, f64)) -> Option<PowerLawFit> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = frequencies_hz
        .iter()
        .zip(psd)
        .filter(|(f, p)| **f > 0.0 && **f >= range_hz.0 && **f <= range_hz.1 && **p > 0.0)
        .filter(|(_, p)| p.is_finite())
        .map(|(f, p)| (f.log10(), p.log10()))
        .unzip();
    if xs.len() < MIN_FIT_POINTS {
        return None;
    }
    let n = xs.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        let dx = x - x_mean;
        let dy = y - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    // A perfectly flat log-PSD leaves nothing for the line to explain.
    let r_squared = if syy <= f64::EPSILON {
        0.0
    } else {
        (sxy * sxy / (sxx * syy)).clamp(0.0, 1.0)
    };
    Some(PowerLawFit {
        slope,
        intercept,
        r_squared,
        range_hz,
        points: xs.len(),
    })
}
pub fn fit_psd(psd: &PsdEstimate, range_hz: (f64, f64)) -> Option<PowerLawFit> {
    fit(&psd.frequencies_hz, &psd.power, range_hz)
}
/// Observed mean power in `band_hz` over the mean the fitted line predicts
/// at the same bins. Above 1.0 the band rises over the 1/f background.
pub fn peak_prominence(psd: &PsdEstimate, fit: &PowerLawFit, band_hz: (f64, f64)) -> Option<f64> {
    let (observed, predicted, count) = psd
        .bins()
        .filter(|(f, _)| *f > 0.0 && *f >= band_hz.0 && *f <= band_hz.1)
        .fold((0.0, 0.0, 0usize), |(o, p, c), (f, power)| {
            (o + power, p + fit.predict(f), c + 1)
        });
    if count == 0 || predicted <= 0.0 || !predicted.is_finite() {
        return None;
    }
    Some(observed / predicted)
}
/// Rough colour of the aperiodic background, from the fitted exponent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
    Black,
    Intermediate,
}
impl NoiseColor {
    pub fn from_slope(slope: f64) -> Self {
        let n = -slope;
        if n < 0.3 {
            NoiseColor::White
        } else if (0.8..=1.2).contains(&n) {
            NoiseColor::Pink
        } else if (1.8..=2.2).contains(&n) {
            NoiseColor::Brown
        } else if n > 2.5 {
            NoiseColor::Black
        } else {
            NoiseColor::Intermediate
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::spectrum::welch;
    use crate::drivers::synth::power_law_noise;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    #[test]
    fn recovers_exact_power_law() {
        let freqs: Vec<f64> = (0..200).map(|k| k as f64 * 0.25).collect();
        let psd: Vec<f64> = freqs.iter().map(|f| 3.0 * f.powf(-1.7)).collect();
        let fit = fit(&freqs, &psd, (1.0, 30.0)).unwrap();
        assert!((fit.slope + 1.7).abs() < 1e-9);
        assert!((fit.predict(10.0) - 3.0 * 10f64.powf(-1.7)).abs() < 1e-9);
        assert!(fit.r_squared > 0.999_999);
        assert_eq!(NoiseColor::from_slope(fit.slope), NoiseColor::Intermediate);
    }
    #[test]
    fn curve_covers_only_the_fit_range() {
        let freqs: Vec<f64> = (0..200).map(|k| k as f64 * 0.25).collect();
        let psd: Vec<f64> = freqs.iter().map(|f| 5.0 * f.powf(-1.0)).collect();
        let fit = fit(&freqs, &psd, (2.0, 20.0)).unwrap();
        let curve = fit.curve(&freqs);
        assert_eq!(curve.len(), 73);
        assert_eq!(curve.first().unwrap().0, 2.0);
        assert_eq!(curve.last().unwrap().0, 20.0);
        for (f, p) in curve {
            assert!((p - 10f64.powf(fit.intercept) * f.powf(fit.slope)).abs() < 1e-12);
            assert!((p - 5.0 / f).abs() < 1e-9);
        }
    }
    #[test]
    fn too_few_points_is_no_fit() {
        let freqs = [1.0, 2.0, 3.0, 4.0];
        let psd = [1.0, 0.5, 0.3, 0.25];
        assert!(fit(&freqs, &psd, (0.0, 100.0)).is_none());
        // zero power bins do not count
        let freqs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let psd = [1.0, 0.0, 0.3, 0.0, 0.2, 0.1];
        assert!(fit(&freqs, &psd, (0.0, 100.0)).is_none());
    }
    #[test]
    fn slope_of_synthetic_noise_is_recovered() {
        let fs = 250.0;
        for exponent in [1.0, 2.0] {
            let mut rng = StdRng::seed_from_u64(42);
            let signal = power_law_noise(7500, exponent, &mut rng);
            let psd = welch(&signal, fs, 4.0, 32);
            let fit = fit_psd(&psd, (1.0, 30.0)).unwrap();
            assert!(
                (fit.slope + exponent).abs() < 0.3,
                "n={exponent}: slope {}",
                fit.slope
            );
        }
    }
    #[test]
    fn prominence_flags_a_bump_above_the_line() {
        let freqs: Vec<f64> = (0..200).map(|k| k as f64 * 0.25).collect();
        let mut power: Vec<f64> = freqs.iter().map(|f| if *f > 0.0 { 1.0 / f } else { 0.0 }).collect();
        let fit = fit(&freqs, &power, (1.0, 30.0)).unwrap();
        let psd = PsdEstimate {
            frequencies_hz: freqs.clone(),
            power: power.clone(),
        };
        let flat = peak_prominence(&psd, &fit, (8.0, 13.0)).unwrap();
        assert!((flat - 1.0).abs() < 1e-9);
        for (f, p) in freqs.iter().zip(power.iter_mut()) {
            if (8.0..=13.0).contains(f) {
                *p *= 4.0;
            }
        }
        let bumped = PsdEstimate {
            frequencies_hz: freqs,
            power,
        };
        assert!((peak_prominence(&bumped, &fit, (8.0, 13.0)).unwrap() - 4.0).abs() < 1e-9);
    }
    #[test]
    fn noise_colors_follow_exponent() {
        assert_eq!(NoiseColor::from_slope(-0.1), NoiseColor::White);
        assert_eq!(NoiseColor::from_slope(-1.0), NoiseColor::Pink);
        assert_eq!(NoiseColor::from_slope(-2.0), NoiseColor::Brown);
        assert_eq!(NoiseColor::from_slope(-3.0), NoiseColor::Black);
    }
}
