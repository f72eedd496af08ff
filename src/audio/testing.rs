//! Test doubles for devices, permissions and asset lookup

use super::capture::{CaptureConfig, SharedCaptureState};
use super::device::{DeviceStream, InputBackend, OutputBackend};
use super::playback::{AssetResolver, OutputSpec, Pull, SharedPlaybackState};
use crate::models::{AssetId, LocalFile};
use crate::permission::{PermissionGate, PermissionPlatform, PermissionState};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(10);

struct FixedPermission(PermissionState);

impl PermissionPlatform for FixedPermission {
    fn state(&self) -> PermissionState {
        self.0
    }

    fn request(&self) -> bool {
        false
    }
}

pub fn granted_gate() -> PermissionGate {
    PermissionGate::new(Arc::new(FixedPermission(PermissionState::Granted)))
}

pub fn denied_gate() -> PermissionGate {
    PermissionGate::new(Arc::new(FixedPermission(PermissionState::Denied)))
}

/// Write a 440 Hz tone as 16-bit PCM
pub fn write_sine_wav(path: &Path, seconds: f32, sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (seconds * sample_rate as f32).round() as u32;
    for n in 0..frames {
        let t = n as f32 / sample_rate as f32;
        let sample = ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// A device thread that runs `tick` every 10 ms until stopped or done
struct FakeStream {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    on_close: Box<dyn FnOnce() + Send>,
}

impl FakeStream {
    fn spawn(
        mut tick: impl FnMut() -> bool + Send + 'static,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                if !tick() {
                    break;
                }
                thread::sleep(TICK);
            }
        });
        Self {
            stop,
            thread: Some(thread),
            on_close: Box::new(on_close),
        }
    }
}

impl DeviceStream for FakeStream {
    fn stop(mut self: Box<Self>) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        let on_close = std::mem::replace(&mut self.on_close, Box::new(|| {}));
        on_close();
    }
}

/// Microphone that feeds a tone in 10 ms blocks
#[derive(Default)]
pub struct FakeInput {
    failing: bool,
    opened: AtomicUsize,
    active: Arc<AtomicUsize>,
}

impl FakeInput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            ..Self::default()
        })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl InputBackend for FakeInput {
    fn open(
        &self,
        config: &CaptureConfig,
        sink: SharedCaptureState,
    ) -> Result<Box<dyn DeviceStream>, String> {
        if self.failing {
            return Err("no such device".to_string());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);

        let rate = config.sample_rate;
        let block = (rate / 100).max(1) as usize;
        let mut n = 0u64;
        let active = self.active.clone();
        let stream = FakeStream::spawn(
            move || {
                let samples: Vec<f32> = (0..block)
                    .map(|i| {
                        let t = (n + i as u64) as f32 / rate as f32;
                        (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.3
                    })
                    .collect();
                n += block as u64;
                sink.process_samples(&samples, rate);
                true
            },
            move || {
                active.fetch_sub(1, Ordering::SeqCst);
            },
        );
        Ok(Box::new(stream))
    }
}

/// Speaker that pulls in real time and logs every open and close
#[derive(Default)]
pub struct FakeOutput {
    fail_next: AtomicBool,
    sessions: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl OutputBackend for FakeOutput {
    fn open(
        &self,
        spec: &OutputSpec,
        source: SharedPlaybackState,
    ) -> Result<Box<dyn DeviceStream>, String> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err("device busy".to_string());
        }

        let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push(format!("open {}", session));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let block = (spec.sample_rate / 100).max(1) as usize;
        let active = self.active.clone();
        let log = self.log.clone();
        let stream = FakeStream::spawn(
            move || matches!(source.pull(block), Pull::Samples(_)),
            move || {
                log.lock().unwrap().push(format!("close {}", session));
                active.fetch_sub(1, Ordering::SeqCst);
            },
        );
        Ok(Box::new(stream))
    }
}

/// In-memory catalog with a counter on blob reads
#[derive(Default)]
pub struct MemoryResolver {
    entries: Mutex<HashMap<AssetId, (LocalFile, Option<Vec<u8>>)>>,
    blob_reads: AtomicUsize,
}

impl MemoryResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, file: &LocalFile, blob: Option<Vec<u8>>) {
        self.entries
            .lock()
            .unwrap()
            .insert(file.id, (file.clone(), blob));
    }

    pub fn blob_reads(&self) -> usize {
        self.blob_reads.load(Ordering::SeqCst)
    }
}

impl AssetResolver for MemoryResolver {
    fn resolve_local_file(&self, id: &AssetId) -> Option<LocalFile> {
        self.entries.lock().unwrap().get(id).map(|(file, _)| file.clone())
    }

    fn resolve_durable_blob(&self, id: &AssetId) -> Option<Vec<u8>> {
        self.blob_reads.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().get(id).and_then(|(_, blob)| blob.clone())
    }
}
