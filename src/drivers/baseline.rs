use std::collections::HashMap;
/// Exponential moving average per `(channel, band)` key.
///
/// The first observation seeds the baseline so there is no pull toward zero
/// on a cold start.
#[derive(Clone, Debug)]
pub struct BaselineTracker {
    decay: f64,
    values: HashMap<(String, String), f64>,
}
impl BaselineTracker {
    /// `decay` is the weight kept from the previous baseline, e.g. 0.9.
    pub fn new(decay: f64) -> Self {
        Self {
            decay: decay.clamp(0.0, 1.0),
            values: HashMap::new(),
        }
    }
    pub fn decay(&self) -> f64 {
        self.decay
    }
    pub fn get(&self, channel: &str, band: &str) -> Option<f64> {
        self.values
            .get(&(channel.to_string(), band.to_string()))
            .copied()
    }
    /// Folds `value` into the baseline and returns the updated baseline.
    pub fn update(&mut self, channel: &str, band: &str, value: f64) -> f64 {
        let decay = self.decay;
        let slot = self
            .values
            .entry((channel.to_string(), band.to_string()))
            .and_modify(|b| *b = decay * *b + (1.0 - decay) * value)
            .or_insert(value);
        *slot
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
/// True when `value` exceeds `ratio_threshold` times the baseline, with the
/// baseline floored at `epsilon`.
pub fn is_elevated(value: f64, baseline: f64, ratio_threshold: f64, epsilon: f64) -> bool {
    value > ratio_threshold * baseline.max(epsilon)
}
/// Rate limit for burst announcements on one channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct BurstGate {
    last_flag_secs: Option<f64>,
}
impl BurstGate {
    /// Returns true if a burst seen at `now_secs` should be announced.
    pub fn should_announce(&mut self, now_secs: f64, cooldown_secs: f64) -> bool {
        match self.last_flag_secs {
            Some(last) if now_secs - last <= cooldown_secs => false,
            _ => {
                self.last_flag_secs = Some(now_secs);
                true
            }
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn first_update_seeds_with_value() {
        let mut tracker = BaselineTracker::new(0.9);
        assert_eq!(tracker.update("O1", "alpha", 10.0), 10.0);
        let next = tracker.update("O1", "alpha", 20.0);
        assert!((next - 11.0).abs() < 1e-12);
        assert_eq!(tracker.get("O1", "alpha"), Some(next));
        assert_eq!(tracker.get("O2", "alpha"), None);
    }
    #[test]
    fn keys_are_independent() {
        let mut tracker = BaselineTracker::new(0.5);
        tracker.update("O1", "alpha", 4.0);
        tracker.update("O1", "theta", 100.0);
        tracker.update("O1", "alpha", 8.0);
        assert_eq!(tracker.get("O1", "alpha"), Some(6.0));
        assert_eq!(tracker.get("O1", "theta"), Some(100.0));
        assert_eq!(tracker.len(), 2);
    }
    #[test]
    fn elevation_uses_ratio_and_floor() {
        assert!(is_elevated(1.6, 1.0, 1.5, 1e-9));
        assert!(!is_elevated(1.5, 1.0, 1.5, 1e-9));
        // zero baseline falls back to epsilon
        assert!(is_elevated(1e-6, 0.0, 1.5, 1e-9));
        assert!(!is_elevated(0.0, 0.0, 1.5, 1e-9));
    }
    #[test]
    fn gate_enforces_cooldown() {
        let mut gate = BurstGate::default();
        assert!(gate.should_announce(10.0, 3.0));
        assert!(!gate.should_announce(12.0, 3.0));
        assert!(gate.should_announce(13.5, 3.0));
    }
}
