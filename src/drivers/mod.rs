// src/drivers/mod.rs
// Signal-processing building blocks; the engine wires them together per tick.
pub mod baseline;
pub mod beat;
pub mod buffer;
pub mod error;
pub mod filter;
pub mod mbll;
pub mod power_law;
pub mod quality;
pub mod source;
pub mod spectrum;
pub mod synth;
// Re-exports so callers rarely need the module paths.
pub use baseline::{is_elevated, BaselineTracker, BurstGate};
pub use beat::{BeatConfig, BeatDetector, BeatEvent, BeatReport, BeatStatus, HeartRate};
pub use buffer::{ChannelBuffers, RingBuffer};
pub use error::EngineError;
pub use filter::{DetrendMode, FilterChain, FilterSpec};
pub use mbll::{Hemodynamics, OpticalPair};
pub use power_law::{NoiseColor, PowerLawFit};
pub use quality::{ChannelStats, QualityConfig, SignalQuality};
pub use source::{ManualSource, SampleBatch, SampleSource, SyntheticSource, SyntheticWaveform};
pub use spectrum::{
    band_power, band_powers, welch, BandPowers, FrequencyBand, PsdEstimate, SpectralPeak,
    EEG_BANDS,
};
