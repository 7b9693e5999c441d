use std::collections::{HashMap, VecDeque};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use crate::drivers::synth;
use crate::drivers::EngineError;
/// Single batch of multi-channel samples as delivered by a device or decoder.
#[derive(Clone, Debug)]
pub struct SampleBatch {
    /// Monotonic arrival time of the batch in seconds.
    pub timestamp_secs: f64,
    pub channel_labels: Vec<String>,
    pub samples: Vec<Vec<f64>>, // channels x samples
}
impl SampleBatch {
    pub fn new(timestamp_secs: f64, channel_labels: Vec<String>, samples: Vec<Vec<f64>>) -> Self {
        Self {
            timestamp_secs,
            channel_labels,
            samples,
        }
    }
    /// Builds a batch from per-sample `channel -> value` frames.
    ///
    /// Channels are taken from the first frame (sorted by name); a channel
    /// missing from a later frame repeats its previous value, or 0.0 if it
    /// never had one.
    pub fn from_frames(timestamp_secs: f64, frames: &[HashMap<String, f64>]) -> Self {
        let mut labels: Vec<String> = frames
            .first()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default();
        labels.sort();
        let mut samples: Vec<Vec<f64>> = labels
            .iter()
            .map(|_| Vec::with_capacity(frames.len()))
            .collect();
        for frame in frames {
            for (label, column) in labels.iter().zip(samples.iter_mut()) {
                let value = frame
                    .get(label)
                    .copied()
                    .or_else(|| column.last().copied())
                    .unwrap_or(0.0);
                column.push(value);
            }
        }
        Self {
            timestamp_secs,
            channel_labels: labels,
            samples,
        }
    }
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.samples.len() != self.channel_labels.len() {
            return Err(EngineError::ChannelMismatch {
                expected: self.channel_labels.len(),
                actual: self.samples.len(),
            });
        }
        if let Some(expected) = self.samples_per_channel() {
            if self.samples.iter().any(|c| c.len() != expected) {
                return Err(EngineError::invalid(
                    "samples",
                    "every channel in a batch must carry the same number of samples",
                ));
            }
        }
        Ok(())
    }
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }
    pub fn samples_per_channel(&self) -> Option<usize> {
        self.samples.first().map(|c| c.len())
    }
}
/// Anything that can hand the engine sample batches without blocking.
///
/// `Ok(None)` means nothing new is available right now.
pub trait SampleSource {
    fn poll(&mut self) -> Result<Option<SampleBatch>, EngineError>;
}
impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn poll(&mut self) -> Result<Option<SampleBatch>, EngineError> {
        (**self).poll()
    }
}
/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<SampleBatch>,
}
impl ManualSource {
    pub fn new(batches: impl IntoIterator<Item = SampleBatch>) -> Self {
        Self {
            queue: batches.into_iter().collect(),
        }
    }
    pub fn push(&mut self, batch: SampleBatch) {
        self.queue.push_back(batch);
    }
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}
impl SampleSource for ManualSource {
    fn poll(&mut self) -> Result<Option<SampleBatch>, EngineError> {
        Ok(self.queue.pop_front())
    }
}
/// Waveform produced by one synthetic channel.
#[derive(Clone, Debug)]
pub enum SyntheticWaveform {
    /// Pink-ish background with an optional alpha-band sinusoid.
    Eeg {
        noise_std: f64,
        alpha_hz: f64,
        alpha_amplitude: f64,
    },
    /// Gaussian pulse train on top of a slow baseline wander.
    Pulse {
        bpm: f64,
        amplitude: f64,
        offset: f64,
        noise_std: f64,
    },
    Flat,
}
/// Deterministic generator that emits one fixed-size batch per poll.
pub struct SyntheticSource {
    sample_rate_hz: f64,
    batch_len: usize,
    labels: Vec<String>,
    waveforms: Vec<SyntheticWaveform>,
    rng: StdRng,
    emitted: u64,
    background: Vec<Vec<f64>>,
    background_pos: usize,
}
impl SyntheticSource {
    const BACKGROUND_LEN: usize = 8192;
    pub fn new(
        sample_rate_hz: f64,
        batch_len: usize,
        channels: Vec<(String, SyntheticWaveform)>,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let (labels, waveforms): (Vec<_>, Vec<_>) = channels.into_iter().unzip();
        let background = waveforms
            .iter()
            .map(|_| synth::power_law_noise(Self::BACKGROUND_LEN, 1.0, &mut rng))
            .collect();
        Self {
            sample_rate_hz,
            batch_len: batch_len.max(1),
            labels,
            waveforms,
            rng,
            emitted: 0,
            background,
            background_pos: 0,
        }
    }
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
    /// Changes the waveform of one channel from the next batch on.
    pub fn set_waveform(&mut self, channel: &str, waveform: SyntheticWaveform) {
        if let Some(idx) = self.labels.iter().position(|l| l == channel) {
            self.waveforms[idx] = waveform;
        }
    }
    fn next_sample(&mut self, channel: usize, t: f64) -> f64 {
        let pink = self.background[channel][self.background_pos];
        match self.waveforms[channel] {
            SyntheticWaveform::Eeg {
                noise_std,
                alpha_hz,
                alpha_amplitude,
            } => {
                noise_std * pink
                    + alpha_amplitude * (2.0 * std::f64::consts::PI * alpha_hz * t).sin()
            }
            SyntheticWaveform::Pulse {
                bpm,
                amplitude,
                offset,
                noise_std,
            } => {
                let period = 60.0 / bpm.max(1.0);
                let phase = t.rem_euclid(period) - period / 2.0;
                let beat = (-phase * phase / (2.0 * 0.05 * 0.05)).exp();
                let wander = 0.3 * amplitude * (2.0 * std::f64::consts::PI * 0.1 * t).sin();
                let noise = Normal::new(0.0, noise_std.max(0.0))
                    .map(|n| n.sample(&mut self.rng))
                    .unwrap_or(0.0);
                offset + amplitude * beat + wander + noise
            }
            SyntheticWaveform::Flat => 0.0,
        }
    }
}
impl SampleSource for SyntheticSource {
    fn poll(&mut self) -> Result<Option<SampleBatch>, EngineError> {
        let dt = 1.0 / self.sample_rate_hz;
        let mut samples = vec![Vec::with_capacity(self.batch_len); self.labels.len()];
        for i in 0..self.batch_len {
            let t = (self.emitted + i as u64) as f64 * dt;
            for (ch, column) in samples.iter_mut().enumerate() {
                let value = self.next_sample(ch, t);
                column.push(value);
            }
            self.background_pos = (self.background_pos + 1) % Self::BACKGROUND_LEN;
        }
        self.emitted += self.batch_len as u64;
        Ok(Some(SampleBatch {
            timestamp_secs: self.emitted as f64 * dt,
            channel_labels: self.labels.clone(),
            samples,
        }))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn frames_are_transposed_into_channel_rows() {
        let frames: Vec<HashMap<String, f64>> = (0..3)
            .map(|i| {
                HashMap::from([("O1".to_string(), i as f64), ("O2".to_string(), -(i as f64))])
            })
            .collect();
        let batch = SampleBatch::from_frames(1.5, &frames);
        assert_eq!(batch.channel_labels, vec!["O1", "O2"]);
        assert_eq!(batch.samples[0], vec![0.0, 1.0, 2.0]);
        assert_eq!(batch.samples[1], vec![0.0, -1.0, -2.0]);
        batch.validate().unwrap();
    }
    #[test]
    fn ragged_batches_fail_validation() {
        let batch = SampleBatch::new(
            0.0,
            vec!["A".into(), "B".into()],
            vec![vec![0.0; 4], vec![0.0; 3]],
        );
        assert!(batch.validate().is_err());
    }
    #[test]
    fn manual_source_drains_in_order() {
        let a = SampleBatch::new(0.0, vec!["A".into()], vec![vec![1.0]]);
        let b = SampleBatch::new(1.0, vec!["A".into()], vec![vec![2.0]]);
        let mut source = ManualSource::new(vec![a]);
        source.push(b);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.poll().unwrap().unwrap().samples[0][0], 1.0);
        assert_eq!(source.poll().unwrap().unwrap().samples[0][0], 2.0);
        assert_eq!(source.remaining(), 0);
        assert!(source.poll().unwrap().is_none());
    }
    #[test]
    fn synthetic_source_is_deterministic() {
        let make = || {
            SyntheticSource::new(
                250.0,
                25,
                vec![(
                    "O1".to_string(),
                    SyntheticWaveform::Eeg {
                        noise_std: 1.0,
                        alpha_hz: 10.0,
                        alpha_amplitude: 2.0,
                    },
                )],
                7,
            )
        };
        let a = make().poll().unwrap().unwrap();
        let b = make().poll().unwrap().unwrap();
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.samples[0].len(), 25);
        assert!((a.timestamp_secs - 0.1).abs() < 1e-12);
    }
}
