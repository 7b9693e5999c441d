// src/engine.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use crate::config::EngineConfig;
use crate::drivers::power_law::{self, NoiseColor};
use crate::drivers::spectrum::{self, dominance_score, dominant_frequencies};
use crate::drivers::{
    is_elevated, mbll, quality, BandPowers, BaselineTracker, BeatDetector, BeatReport, BurstGate,
    ChannelBuffers, ChannelStats, EngineError, FilterChain, SampleBatch, SampleSource,
    SignalQuality,
};
use crate::types::{AnalysisSnapshot, ChannelAnalysis, LoggedBeat};
/// Upper bound on batches drained by one [`AnalysisEngine::poll_and_tick`].
const MAX_BATCHES_PER_POLL: usize = 64;
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
/// Copy of one channel's valid samples, taken under the buffer lock.
struct ChannelWindow {
    name: String,
    samples: Vec<f64>,
    /// Stream time of `samples[0]`.
    start_secs: f64,
}
/// State only ticks touch. Its lock is held for a whole tick so ticks never overlap.
struct Trackers {
    tick: u64,
    baselines: BaselineTracker,
    gates: HashMap<String, BurstGate>,
    detectors: HashMap<String, BeatDetector>,
    beat_log: Vec<LoggedBeat>,
}
/// Per-tick orchestration: buffers in, immutable snapshot out. Ingestion only
/// holds the buffer lock for pushes; filtering and spectra run on copies.
pub struct AnalysisEngine {
    config: EngineConfig,
    chain: FilterChain,
    buffers: Mutex<ChannelBuffers>,
    trackers: Mutex<Trackers>,
    latest: RwLock<Arc<AnalysisSnapshot>>,
}
impl AnalysisEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let buffers =
            ChannelBuffers::new(&config.channels, config.sample_rate_hz, config.window_seconds)?;
        if config.beat.window_seconds > config.window_seconds && !config.pulse_channels.is_empty() {
            log::warn!(
                "beat window {} s exceeds the {} s buffer; the whole buffer will be used",
                config.beat.window_seconds,
                config.window_seconds
            );
        }
        let detectors = config
            .pulse_channels
            .iter()
            .map(|c| (c.clone(), BeatDetector::new(config.beat.clone())))
            .collect();
        let trackers = Trackers {
            tick: 0,
            baselines: BaselineTracker::new(config.baseline.decay),
            gates: HashMap::new(),
            detectors,
            beat_log: Vec::new(),
        };
        log::info!(
            "engine ready: {} channels at {} Hz, {} s window, {} filter stages",
            config.channels.len(),
            config.sample_rate_hz,
            config.window_seconds,
            config.filters.len()
        );
        Ok(Self {
            chain: FilterChain::new(config.sample_rate_hz, config.filters.clone()),
            config,
            buffers: Mutex::new(buffers),
            trackers: Mutex::new(trackers),
            latest: RwLock::new(Arc::new(AnalysisSnapshot::default())),
        })
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    /// Pushes one batch into the ring buffers. Rows for unknown channels are dropped.
    pub fn ingest(&self, batch: &SampleBatch) -> Result<(), EngineError> {
        batch.validate()?;
        let mut buffers = lock(&self.buffers);
        for (label, row) in batch.channel_labels.iter().zip(&batch.samples) {
            buffers.push(label, row);
        }
        Ok(())
    }
    /// Drains what the source has ready, then runs one tick. Source errors are
    /// logged and the tick runs on whatever is already buffered.
    pub fn poll_and_tick(&self, source: &mut dyn SampleSource) -> Arc<AnalysisSnapshot> {
        for _ in 0..MAX_BATCHES_PER_POLL {
            match source.poll() {
                Ok(Some(batch)) => {
                    if let Err(err) = self.ingest(&batch) {
                        log::warn!("dropping malformed batch: {err}");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    log::warn!("sample source failed: {err}");
                    break;
                }
            }
        }
        self.tick()
    }
    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<AnalysisSnapshot> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
    /// Every beat reported so far, oldest first.
    pub fn beat_log(&self) -> Vec<LoggedBeat> {
        lock(&self.trackers).beat_log.clone()
    }
    /// Runs the full pipeline on the current buffer contents and publishes the result.
    pub fn tick(&self) -> Arc<AnalysisSnapshot> {
        let mut trackers = lock(&self.trackers);
        let (stream_secs, windows) = self.copy_windows();
        let mut channels: Vec<ChannelAnalysis> = windows
            .iter()
            .map(|window| match self.analyse_channel(window) {
                Ok(analysis) => analysis,
                Err(err) => {
                    log::warn!("channel {} skipped this tick: {err}", window.name);
                    let quality = quality::assess(&window.samples, &self.config.quality);
                    ChannelAnalysis::unavailable(window.name.clone(), quality, err.to_string())
                }
            })
            .collect();
        trackers.tick += 1;
        let tick = trackers.tick;
        for (channel, window) in channels.iter_mut().zip(&windows) {
            if channel.is_available() {
                self.update_baselines(&mut trackers, channel, stream_secs);
            }
            if let Some(detector) = trackers.detectors.get_mut(&channel.name) {
                if channel.quality != SignalQuality::NonFinite {
                    let report =
                        detector.detect(&window.samples, self.config.sample_rate_hz, window.start_secs);
                    apply_beats(channel, report);
                }
            }
            trackers.beat_log.extend(channel.new_beats.iter().map(|beat| LoggedBeat {
                channel: channel.name.clone(),
                beat: *beat,
            }));
        }
        let snapshot = Arc::new(AnalysisSnapshot {
            tick,
            stream_secs,
            channels,
            hemodynamics: self.hemodynamics(&windows),
        });
        drop(trackers);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        snapshot
    }
    fn copy_windows(&self) -> (f64, Vec<ChannelWindow>) {
        let buffers = lock(&self.buffers);
        let fs = buffers.sample_rate_hz();
        let windows = buffers
            .channel_labels()
            .iter()
            .filter_map(|name| {
                let ring = buffers.buffer(name)?;
                // Leading zero padding of a cold buffer is not signal.
                let valid = (ring.total_pushed().min(ring.capacity() as u64)) as usize;
                let snapshot = ring.snapshot();
                let samples = snapshot[snapshot.len() - valid..].to_vec();
                Some(ChannelWindow {
                    name: name.clone(),
                    start_secs: (ring.total_pushed() - valid as u64) as f64 / fs,
                    samples,
                })
            })
            .collect();
        (buffers.stream_secs(), windows)
    }
    fn analyse_channel(&self, window: &ChannelWindow) -> Result<ChannelAnalysis, EngineError> {
        let cfg = &self.config;
        let fs = cfg.sample_rate_hz;
        let quality = quality::assess(&window.samples, &cfg.quality);
        if quality == SignalQuality::NonFinite {
            return Err(EngineError::NonFinite {
                channel: window.name.clone(),
            });
        }
        let stats = ChannelStats::compute(&window.samples, fs);
        let filtered = self.chain.apply(&window.samples);
        let psd = spectrum::welch(
            &filtered,
            fs,
            cfg.spectral.segment_seconds,
            cfg.spectral.min_samples,
        );
        let fit = power_law::fit_psd(&psd, cfg.spectral.fit_range_hz);
        let prominence =
            fit.and_then(|f| power_law::peak_prominence(&psd, &f, cfg.spectral.prominence_band_hz));
        let (band_powers, relative_band_powers, dominance) = if psd.is_empty() {
            (BandPowers::default(), BandPowers::default(), None)
        } else {
            let powers = spectrum::band_powers(&psd, &cfg.bands, false);
            let dominance = dominance_score(
                &powers,
                &cfg.baseline.target_band,
                &cfg.baseline.neighbor_bands,
            );
            let relative = powers.normalized();
            (powers, relative, Some(dominance))
        };
        let dominant_frequencies =
            dominant_frequencies(&psd, cfg.spectral.max_peaks, cfg.spectral.min_peak_height);
        Ok(ChannelAnalysis {
            name: window.name.clone(),
            quality,
            stats,
            filtered,
            noise_color: fit.map(|f| NoiseColor::from_slope(f.slope)),
            fit,
            prominence,
            band_powers,
            relative_band_powers,
            baselines: BandPowers::default(),
            elevated: Vec::new(),
            burst: false,
            dominance,
            dominant_frequencies,
            beat_status: None,
            heart_rate: None,
            new_beats: Vec::new(),
            error: None,
            psd,
        })
    }
    /// Compares each band against its previous baseline, then folds the
    /// current power in. Nothing is tracked until a PSD exists.
    fn update_baselines(&self, trackers: &mut Trackers, channel: &mut ChannelAnalysis, now_secs: f64) {
        if channel.psd.is_empty() {
            return;
        }
        let cfg = &self.config.baseline;
        let mut baselines = Vec::with_capacity(channel.band_powers.len());
        for (band, power) in channel.band_powers.iter() {
            if let Some(previous) = trackers.baselines.get(&channel.name, band) {
                if is_elevated(power, previous, cfg.ratio_threshold, cfg.epsilon) {
                    channel.elevated.push(band.to_string());
                }
            }
            let updated = trackers.baselines.update(&channel.name, band, power);
            baselines.push((band.to_string(), updated));
        }
        channel.baselines = BandPowers { entries: baselines };
        let target = channel.band_powers.get(&cfg.target_band).unwrap_or(0.0);
        let dominates = cfg
            .neighbor_bands
            .iter()
            .all(|n| channel.band_powers.get(n).map_or(true, |p| target > p));
        channel.burst = dominates && channel.elevated.iter().any(|b| *b == cfg.target_band);
        if channel.burst {
            let gate = trackers.gates.entry(channel.name.clone()).or_default();
            if gate.should_announce(now_secs, cfg.flag_cooldown_seconds) {
                log::info!(
                    "{} burst on {} at {:.1} s (dominance {:.2})",
                    cfg.target_band,
                    channel.name,
                    now_secs,
                    channel.dominance.unwrap_or(0.0)
                );
            }
        }
    }
    fn hemodynamics(&self, windows: &[ChannelWindow]) -> Option<mbll::Hemodynamics> {
        let pair = self.config.optical_pair.as_ref()?;
        let find = |name: &str| windows.iter().find(|w| w.name == name).map(|w| &w.samples);
        mbll::summarize(
            find(&pair.red_channel)?,
            find(&pair.ir_channel)?,
            self.config.sample_rate_hz,
        )
    }
}
fn apply_beats(channel: &mut ChannelAnalysis, report: BeatReport) {
    for beat in &report.new_beats {
        log::debug!(
            "{}: beat at {:.2} s, rr {:.3} s ({:.0} bpm)",
            channel.name,
            beat.timestamp_secs,
            beat.rr_secs,
            beat.bpm
        );
    }
    channel.beat_status = Some(report.status);
    channel.heart_rate = report.heart_rate;
    channel.new_beats = report.new_beats;
}
