// src/lib.rs
pub mod config;
pub mod drivers;
pub mod engine;
pub mod runtime;
pub mod types;
pub use config::{BaselineConfig, EngineConfig, SpectralConfig};
pub use drivers::EngineError;
pub use engine::AnalysisEngine;
pub use runtime::{spawn_ingestion, spawn_ticker, PacedSource, SnapshotSlot, StopSignal};
pub use types::{AnalysisSnapshot, ChannelAnalysis, LoggedBeat};
