// src/runtime.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crate::drivers::{EngineError, SampleBatch, SampleSource};
use crate::engine::AnalysisEngine;
use crate::types::AnalysisSnapshot;
/// Longest single sleep, so a stop request is noticed promptly.
const MAX_NAP: Duration = Duration::from_millis(20);
/// Cooperative shutdown flag shared by the worker threads.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);
impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
/// Holds an always-ready source back to wall-clock rate.
pub struct PacedSource<S> {
    inner: S,
    sample_rate_hz: f64,
    started: Option<Instant>,
    delivered: u64,
}
impl<S: SampleSource> PacedSource<S> {
    pub fn new(inner: S, sample_rate_hz: f64) -> Self {
        Self {
            inner,
            sample_rate_hz,
            started: None,
            delivered: 0,
        }
    }
}
impl<S: SampleSource> SampleSource for PacedSource<S> {
    fn poll(&mut self) -> Result<Option<SampleBatch>, EngineError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started.elapsed().as_secs_f64() * self.sample_rate_hz;
        if self.delivered as f64 > due {
            return Ok(None);
        }
        let batch = self.inner.poll()?;
        if let Some(batch) = &batch {
            self.delivered += batch.samples_per_channel().unwrap_or(0) as u64;
        }
        Ok(batch)
    }
}
/// Moves batches from `source` into the engine until stopped. Sleeps for
/// `idle` whenever the source has nothing; source errors are logged and retried.
pub fn spawn_ingestion<S>(
    engine: Arc<AnalysisEngine>,
    mut source: S,
    stop: StopSignal,
    idle: Duration,
) -> JoinHandle<()>
where
    S: SampleSource + Send + 'static,
{
    thread::spawn(move || {
        log::debug!("ingestion thread started");
        while !stop.is_stopped() {
            match source.poll() {
                Ok(Some(batch)) => {
                    if let Err(err) = engine.ingest(&batch) {
                        log::warn!("dropping batch: {err}");
                    }
                }
                Ok(None) => thread::sleep(idle.min(MAX_NAP)),
                Err(err) => {
                    log::warn!("sample source failed: {err}");
                    thread::sleep(idle.min(MAX_NAP));
                }
            }
        }
        log::debug!("ingestion thread stopped");
    })
}
#[derive(Default)]
struct SlotState {
    latest: Option<Arc<AnalysisSnapshot>>,
    closed: bool,
}
/// Single-value hand-off between the ticker and a consumer. Publishing
/// replaces whatever the consumer has not taken yet, so a slow reader always
/// sees the newest snapshot.
#[derive(Default)]
pub struct SnapshotSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}
impl SnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }
    /// Stores `snapshot` and wakes a waiting consumer. Returns the tick of the
    /// unread snapshot it displaced, if any.
    pub fn publish(&self, snapshot: Arc<AnalysisSnapshot>) -> Option<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let displaced = state.latest.replace(snapshot).map(|old| old.tick);
        drop(state);
        self.ready.notify_one();
        displaced
    }
    /// Takes the pending snapshot without waiting.
    pub fn take(&self) -> Option<Arc<AnalysisSnapshot>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest
            .take()
    }
    /// Waits up to `timeout` for a snapshot. `None` on timeout, or once the
    /// slot is closed and drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<AnalysisSnapshot>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(snapshot) = state.latest.take() {
                return Some(snapshot);
            }
            let now = Instant::now();
            if state.closed || now >= deadline {
                return None;
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
    /// Marks the slot closed. The ticker exits on its next tick and waiting
    /// consumers return.
    pub fn close(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
        self.ready.notify_all();
    }
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).closed
    }
}
/// Ticks the engine every `period` and publishes each snapshot to `slot`.
///
/// A tick that overruns its period is not caught up on; the schedule restarts
/// from the end of the late tick. A snapshot the consumer has not taken is
/// replaced by the newer one. The thread ends on stop or once the slot is
/// closed, and closes the slot on the way out.
pub fn spawn_ticker(
    engine: Arc<AnalysisEngine>,
    period: Duration,
    stop: StopSignal,
    slot: Arc<SnapshotSlot>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut next = Instant::now() + period;
        while !stop.is_stopped() {
            if slot.is_closed() {
                log::info!("snapshot consumer hung up, ticker exiting");
                break;
            }
            let now = Instant::now();
            if now < next {
                thread::sleep((next - now).min(MAX_NAP));
                continue;
            }
            let snapshot = engine.tick();
            if let Some(stale) = slot.publish(snapshot) {
                log::debug!("consumer busy, replaced unread snapshot {stale}");
            }
            next += period;
            let now = Instant::now();
            if next < now {
                log::debug!("tick overran its {period:?} period");
                next = now + period;
            }
        }
        slot.close();
    })
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::drivers::{SyntheticSource, SyntheticWaveform};
    fn eeg_source(fs: f64) -> SyntheticSource {
        let wave = SyntheticWaveform::Eeg {
            noise_std: 1.0,
            alpha_hz: 10.0,
            alpha_amplitude: 1.0,
        };
        SyntheticSource::new(
            fs,
            25,
            vec![("O1".to_string(), wave.clone()), ("O2".to_string(), wave)],
            7,
        )
    }
    #[test]
    fn paced_source_waits_for_the_clock() {
        let mut paced = PacedSource::new(eeg_source(250.0), 250.0);
        assert!(paced.poll().unwrap().is_some());
        // 25 samples at 250 Hz are 100 ms ahead of the clock
        assert!(paced.poll().unwrap().is_none());
    }
    #[test]
    fn threads_run_and_stop_cleanly() {
        let engine = Arc::new(AnalysisEngine::new(EngineConfig::eeg(["O1", "O2"])).unwrap());
        let stop = StopSignal::new();
        let slot = Arc::new(SnapshotSlot::new());
        let ingest = spawn_ingestion(
            Arc::clone(&engine),
            PacedSource::new(eeg_source(250.0), 250.0),
            stop.clone(),
            Duration::from_millis(5),
        );
        let ticker = spawn_ticker(
            Arc::clone(&engine),
            Duration::from_millis(30),
            stop.clone(),
            Arc::clone(&slot),
        );
        let mut ticks = Vec::new();
        while ticks.len() < 3 {
            let snapshot = slot.recv_timeout(Duration::from_secs(5)).unwrap();
            ticks.push(snapshot.tick);
        }
        stop.stop();
        ingest.join().unwrap();
        ticker.join().unwrap();
        assert!(ticks.windows(2).all(|w| w[1] > w[0]));
        assert!(engine.latest().stream_secs > 0.0);
    }
    #[test]
    fn ticker_exits_when_consumer_hangs_up() {
        let engine = Arc::new(AnalysisEngine::new(EngineConfig::eeg(["O1"])).unwrap());
        let slot = Arc::new(SnapshotSlot::new());
        slot.close();
        let ticker = spawn_ticker(engine, Duration::from_millis(5), StopSignal::new(), slot);
        ticker.join().unwrap();
    }
    #[test]
    fn stalled_consumer_gets_the_newest_snapshot() {
        let engine = Arc::new(AnalysisEngine::new(EngineConfig::eeg(["O1"])).unwrap());
        let stop = StopSignal::new();
        let slot = Arc::new(SnapshotSlot::new());
        let ticker = spawn_ticker(
            Arc::clone(&engine),
            Duration::from_millis(5),
            stop.clone(),
            Arc::clone(&slot),
        );
        // consumer stalls for many tick periods
        thread::sleep(Duration::from_millis(300));
        stop.stop();
        ticker.join().unwrap();
        let latest = engine.latest().tick;
        assert!(latest > 5, "only {latest} ticks ran");
        let received = slot.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.tick, latest);
        // drained and closed
        assert!(slot.recv_timeout(Duration::from_millis(10)).is_none());
    }
    #[test]
    fn publish_replaces_unread_snapshot() {
        let slot = SnapshotSlot::new();
        let snapshot = |tick| Arc::new(AnalysisSnapshot { tick, ..AnalysisSnapshot::default() });
        assert_eq!(slot.publish(snapshot(1)), None);
        assert_eq!(slot.publish(snapshot(2)), Some(1));
        assert_eq!(slot.take().unwrap().tick, 2);
        assert!(slot.take().is_none());
        assert!(slot.recv_timeout(Duration::from_millis(5)).is_none());
    }
}
