use std::collections::{HashMap, VecDeque};
use crate::drivers::EngineError;
/// Fixed-length per-channel history, pre-filled with zeros until warm.
#[derive(Clone, Debug)]
pub struct RingBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
    total_pushed: u64,
}
impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: std::iter::repeat(0.0).take(capacity).collect(),
            capacity,
            total_pushed: 0,
        }
    }
    pub fn with_history_seconds(
        sample_rate_hz: f64,
        history_seconds: f64,
    ) -> Result<Self, EngineError> {
        if !(sample_rate_hz > 0.0) {
            return Err(EngineError::InvalidSampleRate);
        }
        if !(history_seconds > 0.0) {
            return Err(EngineError::InvalidWindow);
        }
        Ok(Self::new(capacity_for(sample_rate_hz, history_seconds)))
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    /// Number of samples ever pushed; doubles as the stream sample clock.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }
    /// True once a full window of real samples has replaced the zero fill.
    pub fn is_warm(&self) -> bool {
        self.total_pushed >= self.capacity as u64
    }
    pub fn push(&mut self, new_samples: &[f64]) {
        if new_samples.is_empty() {
            return;
        }
        self.total_pushed += new_samples.len() as u64;
        if new_samples.len() >= self.capacity {
            // Bursty delivery: only the newest `capacity` values survive.
            self.samples.clear();
            self.samples
                .extend(&new_samples[new_samples.len() - self.capacity..]);
            return;
        }
        self.samples.drain(..new_samples.len());
        self.samples.extend(new_samples);
    }
    pub fn snapshot(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}
pub(crate) fn capacity_for(sample_rate_hz: f64, seconds: f64) -> usize {
    ((sample_rate_hz * seconds).ceil() as usize).max(1)
}
/// The set of ring buffers for every configured channel, keyed by name.
#[derive(Clone, Debug)]
pub struct ChannelBuffers {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    buffers: Vec<RingBuffer>,
    sample_rate_hz: f64,
}
impl ChannelBuffers {
    pub fn new(
        labels: &[String],
        sample_rate_hz: f64,
        window_seconds: f64,
    ) -> Result<Self, EngineError> {
        let template = RingBuffer::with_history_seconds(sample_rate_hz, window_seconds)?;
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(EngineError::DuplicateChannel(label.clone()));
            }
        }
        Ok(Self {
            labels: labels.to_vec(),
            index,
            buffers: vec![template; labels.len()],
            sample_rate_hz,
        })
    }
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
    pub fn channel_labels(&self) -> &[String] {
        &self.labels
    }
    pub fn contains(&self, channel: &str) -> bool {
        self.index.contains_key(channel)
    }
    /// Appends to one channel; unknown channels are ignored.
    pub fn push(&mut self, channel: &str, new_samples: &[f64]) {
        match self.index.get(channel) {
            Some(&i) => self.buffers[i].push(new_samples),
            None => log::trace!("dropping {} samples for unknown channel {channel}", new_samples.len()),
        }
    }
    pub fn snapshot(&self, channel: &str) -> Option<Vec<f64>> {
        self.index.get(channel).map(|&i| self.buffers[i].snapshot())
    }
    pub fn buffer(&self, channel: &str) -> Option<&RingBuffer> {
        self.index.get(channel).map(|&i| &self.buffers[i])
    }
    /// Seconds of signal seen on the furthest-advanced channel.
    pub fn stream_secs(&self) -> f64 {
        self.buffers
            .iter()
            .map(RingBuffer::total_pushed)
            .max()
            .unwrap_or(0) as f64
            / self.sample_rate_hz
    }
}
