// src/main.rs
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::{anyhow, Context, Result};
use biostream::drivers::{
    EngineError, SampleBatch, SampleSource, SyntheticSource, SyntheticWaveform,
};
use biostream::{
    spawn_ingestion, spawn_ticker, AnalysisEngine, AnalysisSnapshot, EngineConfig, PacedSource,
    SnapshotSlot, StopSignal,
};
use clap::{Parser, ValueEnum};
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Profile {
    /// Four EEG channels with intermittent alpha
    Eeg,
    /// Red / infrared optical pair with a 72 bpm pulse
    Pulse,
}
/// Runs the analysis engine against a synthetic stream and logs each snapshot.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON engine configuration; the profile preset is used when absent
    #[arg(long)]
    config: Option<PathBuf>,
    /// How long to stream for
    #[arg(long, default_value_t = 20.0)]
    seconds: f64,
    /// Tick period in milliseconds
    #[arg(long, default_value_t = 200)]
    tick_ms: u64,
    #[arg(long, value_enum, default_value_t = Profile::Eeg)]
    profile: Profile,
    /// Seed for the synthetic source
    #[arg(long, default_value_t = 1)]
    seed: u64,
}
fn synthetic_source(config: &EngineConfig, profile: Profile, seed: u64) -> SyntheticSource {
    let batch_len = ((config.sample_rate_hz / 25.0).round() as usize).max(1);
    let channels = config
        .channels
        .iter()
        .map(|name| {
            let wave = match profile {
                Profile::Eeg => SyntheticWaveform::Eeg {
                    noise_std: 10.0,
                    alpha_hz: 10.0,
                    alpha_amplitude: 0.0,
                },
                Profile::Pulse => SyntheticWaveform::Pulse {
                    bpm: 72.0,
                    amplitude: 40.0,
                    offset: 20_000.0,
                    noise_std: 2.0,
                },
            };
            (name.clone(), wave)
        })
        .collect();
    SyntheticSource::new(config.sample_rate_hz, batch_len, channels, seed)
}
fn log_snapshot(snapshot: &AnalysisSnapshot) {
    for channel in &snapshot.channels {
        if let Some(err) = &channel.error {
            log::warn!("[{:>4}] {}: unavailable ({err})", snapshot.tick, channel.name);
            continue;
        }
        let slope = channel.fit.map(|f| format!("{:.2}", f.slope)).unwrap_or("-".into());
        let peak = channel
            .dominant_frequencies
            .first()
            .map(|p| format!("{:.1} Hz", p.frequency_hz))
            .unwrap_or("-".into());
        let dominance = channel
            .dominance
            .map(|d| format!("{d:.2}"))
            .unwrap_or("-".into());
        let bpm = channel
            .heart_rate
            .map(|hr| format!(" bpm {:.0}", hr.bpm))
            .unwrap_or_default();
        log::info!(
            "[{:>4}] t={:6.1}s {:<4} {:?} slope {slope} peak {peak} dominance {dominance}{}{bpm}",
            snapshot.tick,
            snapshot.stream_secs,
            channel.name,
            channel.quality,
            if channel.burst { " BURST" } else { "" },
        );
    }
    if let Some(hemo) = &snapshot.hemodynamics {
        log::info!(
            "[{:>4}] dHbO {:+.4} ± {:.4} ({:+.5}/s)  dHbR {:+.4} ± {:.4} ({:+.5}/s)",
            snapshot.tick,
            hemo.hbo_mean,
            hemo.hbo_std,
            hemo.hbo_slope,
            hemo.hbr_mean,
            hemo.hbr_std,
            hemo.hbr_slope
        );
    }
}
/// Demo source whose EEG channels gain a strong alpha rhythm once `alpha` is set.
struct DemoSource {
    inner: SyntheticSource,
    channels: Vec<String>,
    alpha: Arc<AtomicBool>,
    alpha_applied: bool,
}
impl SampleSource for DemoSource {
    fn poll(&mut self) -> Result<Option<SampleBatch>, EngineError> {
        if !self.alpha_applied && self.alpha.load(Ordering::Relaxed) {
            for name in &self.channels {
                self.inner.set_waveform(
                    name,
                    SyntheticWaveform::Eeg {
                        noise_std: 10.0,
                        alpha_hz: 10.0,
                        alpha_amplitude: 25.0,
                    },
                );
            }
            self.alpha_applied = true;
        }
        self.inner.poll()
    }
}
fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => match args.profile {
            Profile::Eeg => EngineConfig::default(),
            Profile::Pulse => EngineConfig::pulse("red", "ir"),
        },
    };
    let engine = Arc::new(AnalysisEngine::new(config.clone()).context("invalid engine config")?);
    let alpha = Arc::new(AtomicBool::new(false));
    let source = DemoSource {
        inner: synthetic_source(&config, args.profile, args.seed),
        channels: config.channels.clone(),
        alpha: Arc::clone(&alpha),
        alpha_applied: false,
    };
    let stop = StopSignal::new();
    let slot = Arc::new(SnapshotSlot::new());
    let ingest = spawn_ingestion(
        Arc::clone(&engine),
        PacedSource::new(source, config.sample_rate_hz),
        stop.clone(),
        Duration::from_millis(5),
    );
    let ticker = spawn_ticker(
        Arc::clone(&engine),
        Duration::from_millis(args.tick_ms.max(1)),
        stop.clone(),
        Arc::clone(&slot),
    );
    let started = Instant::now();
    let run_for = Duration::from_secs_f64(args.seconds.max(0.0));
    // EEG demo: alpha switches on for the second half of the run
    let alpha_at = run_for / 2;
    while started.elapsed() < run_for {
        match slot.recv_timeout(Duration::from_millis(500)) {
            Some(snapshot) => log_snapshot(&snapshot),
            None if slot.is_closed() => break,
            None => {}
        }
        if args.profile == Profile::Eeg
            && started.elapsed() >= alpha_at
            && !alpha.swap(true, Ordering::Relaxed)
        {
            log::info!("switching on 10 Hz alpha");
        }
    }
    stop.stop();
    ingest
        .join()
        .map_err(|_| anyhow!("ingestion thread panicked"))?;
    ticker
        .join()
        .map_err(|_| anyhow!("ticker thread panicked"))?;
    let latest = engine.latest();
    log::info!(
        "stopped after {} ticks, {:.1} s of signal, {} beats logged",
        latest.tick,
        latest.stream_secs,
        engine.beat_log().len()
    );
    Ok(())
}
