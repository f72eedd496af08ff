//! Audio capture session
//!
//! Owns the input device for the length of one take. Samples arrive on the
//! device thread, are metered and appended to the take's WAV file; the
//! session exposes a live level stream while recording.

use super::device::{DeviceStream, InputBackend};
use super::meter::{self, AmplitudeMeter, LevelStream};
use super::recorder::WavRecorder;
use crate::error::{AudioError, Result};
use crate::models::{AssetId, LocalFile, TakeFile, RECORDING_EXTENSION};
use crate::permission::PermissionGate;
use crate::settings::{DEFAULT_METER_INTERVAL, DEFAULT_SAMPLE_RATE};
use crate::storage::LocalStorage;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};

/// Observable state of a capture session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Recording(AssetId),
}

/// Audio capture configuration
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Sample rate requested from the device
    pub sample_rate: u32,
    /// Cadence of the level stream
    pub meter_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            meter_interval: DEFAULT_METER_INTERVAL,
        }
    }
}

/// State shared between the device thread and the session - thread-safe
#[derive(Clone)]
pub struct SharedCaptureState {
    inner: Arc<Mutex<CaptureStateInner>>,
}

struct CaptureStateInner {
    /// Smoothed RMS level (linear)
    volume_level: f32,
    /// Peak level with slow decay
    peak_level: f32,
    /// Sample rate reported by the device
    sample_rate: u32,
    /// Frames received so far
    frames: u64,
    /// Destination of the take, absent once detached
    recorder: Option<WavRecorder>,
    /// First write failure, if any
    write_error: Option<String>,
    /// Device rate that disagreed with the file header
    rate_mismatch: Option<u32>,
}

impl SharedCaptureState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureStateInner {
                volume_level: 0.0,
                peak_level: 0.0,
                sample_rate: DEFAULT_SAMPLE_RATE,
                frames: 0,
                recorder: None,
                write_error: None,
                rate_mismatch: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CaptureStateInner> {
        // A panicked device callback must not take the session down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn volume_level(&self) -> f32 {
        self.lock().volume_level
    }

    pub fn peak_level(&self) -> f32 {
        self.lock().peak_level
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn frames(&self) -> u64 {
        self.lock().frames
    }

    /// Device rate that differed from the take's header, if that happened
    pub fn rate_mismatch(&self) -> Option<u32> {
        self.lock().rate_mismatch
    }

    /// Route incoming samples into a file
    pub fn attach(&self, recorder: WavRecorder) {
        self.lock().recorder = Some(recorder);
    }

    /// Take the file back, together with the first write error
    pub fn detach(&self) -> (Option<WavRecorder>, Option<String>) {
        let mut inner = self.lock();
        (inner.recorder.take(), inner.write_error.take())
    }

    /// Process incoming mono samples
    pub fn process_samples(&self, samples: &[f32], sample_rate: u32) {
        let mut inner = self.lock();
        inner.sample_rate = sample_rate;

        if samples.is_empty() {
            return;
        }

        let rms = calculate_rms(samples);
        // Smooth volume level for display
        inner.volume_level = inner.volume_level * 0.7 + rms * 0.3;
        inner.peak_level = (inner.peak_level * 0.95).max(calculate_peak(samples));
        inner.frames += samples.len() as u64;

        if inner.write_error.is_some() {
            return;
        }
        let header_rate = inner.recorder.as_ref().map(WavRecorder::sample_rate);
        if let Some(header_rate) = header_rate {
            if header_rate != sample_rate && inner.rate_mismatch.is_none() {
                warn!(
                    "Device delivers {} Hz but the take is written at {} Hz; playback will be off-speed",
                    sample_rate, header_rate
                );
                inner.rate_mismatch = Some(sample_rate);
            }
        }
        if let Some(recorder) = inner.recorder.as_mut() {
            if let Err(e) = recorder.write_samples(samples) {
                warn!("Dropping captured audio: {}", e);
                inner.write_error = Some(e);
            }
        }
    }
}

impl Default for SharedCaptureState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything owned by a recording in progress
struct ActiveCapture {
    file: LocalFile,
    shared: SharedCaptureState,
    stream: Box<dyn DeviceStream>,
    meter: AmplitudeMeter,
    levels: broadcast::Sender<f32>,
    started: Instant,
}

/// Records one take at a time from the input device
pub struct CaptureSession {
    gate: PermissionGate,
    backend: Arc<dyn InputBackend>,
    storage: LocalStorage,
    config: CaptureConfig,
    active: Option<ActiveCapture>,
    state: watch::Sender<RecordState>,
}

impl CaptureSession {
    pub fn new(
        gate: PermissionGate,
        backend: Arc<dyn InputBackend>,
        storage: LocalStorage,
        config: CaptureConfig,
    ) -> Self {
        Self {
            gate,
            backend,
            storage,
            config,
            active: None,
            state: watch::channel(RecordState::Idle).0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Subscribe to state changes
    pub fn watch_state(&self) -> watch::Receiver<RecordState> {
        self.state.subscribe()
    }

    /// Wall-clock time since the current take started
    pub fn elapsed(&self) -> Option<Duration> {
        self.active.as_ref().map(|a| a.started.elapsed())
    }

    /// Live levels of the current take; `None` when idle
    ///
    /// Dropping the stream does not stop the recording.
    pub fn levels(&self) -> Option<LevelStream> {
        self.active.as_ref().map(|a| meter::subscribe(&a.levels))
    }

    /// Start recording a new take
    ///
    /// While a take is already recording this returns its target instead of
    /// allocating another one.
    pub async fn start(&mut self) -> Result<LocalFile> {
        if let Some(active) = &self.active {
            debug!("Capture already running for {}", active.file.id);
            return Ok(active.file.clone());
        }

        if !self.gate.check_or_request().await.is_granted() {
            return Err(AudioError::PermissionDenied);
        }

        let file = self.storage.allocate(RECORDING_EXTENSION);
        let recorder = WavRecorder::create(&file.path, self.config.sample_rate)
            .map_err(AudioError::DeviceSetupFailed)?;

        let shared = SharedCaptureState::new();
        shared.attach(recorder);

        let backend = self.backend.clone();
        let config = self.config.clone();
        let sink = shared.clone();
        let opened = tokio::task::spawn_blocking(move || backend.open(&config, sink))
            .await
            .map_err(|e| format!("Device thread failed: {}", e))
            .and_then(|result| result);

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to open capture device: {}", e);
                drop(shared.detach());
                remove_take(&file);
                return Err(AudioError::DeviceSetupFailed(e));
            }
        };

        let levels = meter::level_channel();
        let meter = AmplitudeMeter::spawn(shared.clone(), self.config.meter_interval, levels.clone());

        info!("Recording started: {}", file.path.display());
        self.state.send_replace(RecordState::Recording(file.id));
        self.active = Some(ActiveCapture {
            file: file.clone(),
            shared,
            stream,
            meter,
            levels,
            started: Instant::now(),
        });

        Ok(file)
    }

    /// Stop recording and return the finished take
    pub async fn stop(&mut self) -> Result<TakeFile> {
        let active = self.active.take().ok_or(AudioError::NoActiveSession)?;
        let duration = active.started.elapsed().as_secs_f64();

        let ActiveCapture {
            file,
            shared,
            stream,
            meter,
            levels,
            ..
        } = active;

        if let Err(e) = tokio::task::spawn_blocking(move || stream.stop()).await {
            warn!("Capture device thread did not shut down cleanly: {}", e);
        }

        // Level subscribers end once both senders are gone
        drop(levels);
        meter.stop().await;
        self.state.send_replace(RecordState::Idle);

        let finalized = match shared.detach() {
            (_, Some(e)) => Err(e),
            (Some(recorder), None) => recorder.finalize().map(|_| ()),
            (None, None) => Err("recording target missing".to_string()),
        };

        if let Err(e) = finalized {
            remove_take(&file);
            return Err(AudioError::RecordingFailed(e));
        }

        info!(
            "Recording stopped: {} ({:.2}s, {} frames)",
            file.path.display(),
            duration,
            shared.frames()
        );
        Ok(TakeFile { file, duration })
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            warn!("Capture session dropped while recording, discarding {}", active.file.id);
            active.stream.stop();
            drop(active.shared.detach());
            remove_take(&active.file);
        }
    }
}

fn remove_take(file: &LocalFile) {
    if let Err(e) = std::fs::remove_file(&file.path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", file.path.display(), e);
        }
    }
}

/// Calculate RMS volume from samples
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Calculate peak volume from samples
pub fn calculate_peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}
