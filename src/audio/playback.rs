//! Audio playback engine
//!
//! A single actor task owns the output device. Commands are processed one at
//! a time, so a new `play` only starts after the previous asset's device has
//! been stopped and released. At most one asset is ever playing or paused.

use super::decoder::{open_source, SampleSource, SourceOpener};
use super::device::{DeviceStream, OutputBackend};
use crate::error::{AudioError, Result};
use crate::models::{AssetId, LocalFile};
use crate::storage::LocalStorage;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Observable state of the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing(AssetId),
    Paused(AssetId),
}

impl PlaybackState {
    pub fn asset(&self) -> Option<AssetId> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Playing(id) | PlaybackState::Paused(id) => Some(*id),
        }
    }
}

/// An error that happened after `play` had already returned
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackError {
    pub asset: AssetId,
    pub error: AudioError,
}

/// Where the engine finds the bytes of an asset
pub trait AssetResolver: Send + Sync + 'static {
    /// Conventional local file of the asset; it may not exist on disk
    fn resolve_local_file(&self, id: &AssetId) -> Option<LocalFile>;

    /// Durable copy of the asset's bytes, if one was kept
    fn resolve_durable_blob(&self, id: &AssetId) -> Option<Vec<u8>>;
}

/// Format requested from the output device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// What the device should do with the next buffer
#[derive(Debug, PartialEq)]
pub enum Pull {
    Samples(Vec<f32>),
    Finished,
}

#[derive(Debug)]
enum DeviceEventKind {
    Finished,
    DecodeError(String),
}

/// Reported by the device side, tagged with the session it belongs to
#[derive(Debug)]
struct DeviceEvent {
    generation: u64,
    kind: DeviceEventKind,
}

/// Shared state for audio playback - thread-safe
#[derive(Clone)]
pub struct SharedPlaybackState {
    inner: Arc<Mutex<PlaybackStateInner>>,
}

struct PlaybackStateInner {
    source: Box<dyn SampleSource>,
    /// Decoded but not yet delivered samples
    pending: VecDeque<f32>,
    sample_rate: u32,
    /// Frames delivered so far
    position: u64,
    paused: bool,
    finished: bool,
    generation: u64,
    events: mpsc::UnboundedSender<DeviceEvent>,
}

impl SharedPlaybackState {
    fn new(
        source: Box<dyn SampleSource>,
        generation: u64,
        events: mpsc::UnboundedSender<DeviceEvent>,
    ) -> Self {
        let sample_rate = source.sample_rate();
        Self {
            inner: Arc::new(Mutex::new(PlaybackStateInner {
                source,
                pending: VecDeque::new(),
                sample_rate,
                position: 0,
                paused: false,
                finished: false,
                generation,
                events,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackStateInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get current playback position in seconds
    pub fn current_time(&self) -> f64 {
        let inner = self.lock();
        inner.position as f64 / inner.sample_rate.max(1) as f64
    }

    fn set_paused(&self, paused: bool) {
        self.lock().paused = paused;
    }

    /// Get up to `frames` samples for the device
    ///
    /// While paused the device gets silence and the position holds. End of
    /// media and decode errors are reported to the engine exactly once.
    pub fn pull(&self, frames: usize) -> Pull {
        let mut inner = self.lock();
        if inner.finished {
            return Pull::Finished;
        }
        if inner.paused {
            return Pull::Samples(vec![0.0; frames]);
        }

        while inner.pending.len() < frames {
            match inner.source.next_chunk() {
                Ok(Some(chunk)) => inner.pending.extend(chunk),
                Ok(None) => break,
                Err(e) => {
                    warn!("Playback decode error: {}", e);
                    inner.finished = true;
                    inner.pending.clear();
                    inner.report(DeviceEventKind::DecodeError(e));
                    return Pull::Finished;
                }
            }
        }

        if inner.pending.is_empty() {
            inner.finished = true;
            inner.report(DeviceEventKind::Finished);
            return Pull::Finished;
        }

        let count = frames.min(inner.pending.len());
        let samples: Vec<f32> = inner.pending.drain(..count).collect();
        inner.position += samples.len() as u64;
        Pull::Samples(samples)
    }
}

impl PlaybackStateInner {
    fn report(&self, kind: DeviceEventKind) {
        let _ = self.events.send(DeviceEvent {
            generation: self.generation,
            kind,
        });
    }
}

enum Command {
    Play(AssetId, oneshot::Sender<Result<()>>),
    Toggle(AssetId, oneshot::Sender<Result<()>>),
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

/// Handle to the playback actor; cheap to clone
#[derive(Clone)]
pub struct PlaybackEngine {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PlaybackState>,
    errors: broadcast::Sender<PlaybackError>,
}

impl PlaybackEngine {
    /// Start the engine on the current tokio runtime
    pub fn spawn(
        resolver: Arc<dyn AssetResolver>,
        backend: Arc<dyn OutputBackend>,
        storage: LocalStorage,
    ) -> Self {
        Self::spawn_with_decoder(resolver, backend, storage, open_source)
    }

    /// Like [`PlaybackEngine::spawn`] with a custom decoder
    pub fn spawn_with_decoder(
        resolver: Arc<dyn AssetResolver>,
        backend: Arc<dyn OutputBackend>,
        storage: LocalStorage,
        open_source: SourceOpener,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PlaybackState::Idle);
        let (errors_tx, _) = broadcast::channel(16);

        let actor = EngineActor {
            resolver,
            backend,
            storage,
            open_source,
            state: state_tx,
            errors: errors_tx.clone(),
            events: events_tx,
            current: None,
            generation: 0,
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            state: state_rx,
            errors: errors_tx,
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Subscribe to state changes
    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    /// Subscribe to errors raised while playing
    pub fn errors(&self) -> broadcast::Receiver<PlaybackError> {
        self.errors.subscribe()
    }

    /// Play an asset, tearing down whatever else was active
    pub async fn play(&self, id: AssetId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Play(id, tx)).await?;
        rx.await.map_err(|_| engine_gone())?
    }

    /// Pause `id` if it is playing, otherwise play it
    pub async fn toggle(&self, id: AssetId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Toggle(id, tx)).await?;
        rx.await.map_err(|_| engine_gone())?
    }

    pub async fn pause(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Pause(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn resume(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Resume(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Stop playback and release the device; safe to call in any state
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Stop(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Wait until the engine is idle again
    pub async fn wait_idle(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == PlaybackState::Idle).await;
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| engine_gone())
    }
}

fn engine_gone() -> AudioError {
    AudioError::PlaybackFailed("playback engine has shut down".to_string())
}

/// Local file if present, else the durable blob restored onto its path
///
/// Takes owned handles so the actor is not borrowed across the blocking hop.
async fn resolve(
    resolver: Arc<dyn AssetResolver>,
    storage: LocalStorage,
    id: AssetId,
) -> Result<LocalFile> {
    tokio::task::spawn_blocking(move || {
        let file = resolver
            .resolve_local_file(&id)
            .ok_or_else(|| AudioError::AssetUnavailable(format!("unknown asset {}", id)))?;
        if file.exists() {
            return Ok(file);
        }

        let bytes = resolver.resolve_durable_blob(&id).ok_or_else(|| {
            AudioError::AssetUnavailable(format!(
                "{} has neither a local file nor an embedded copy",
                id
            ))
        })?;
        storage.materialize(&file, &bytes).map_err(|e| {
            AudioError::AssetUnavailable(format!("failed to restore {}: {}", id, e))
        })?;
        info!("Restored {} from embedded copy", file.path.display());
        Ok(file)
    })
    .await
    .map_err(|e| AudioError::PlaybackFailed(e.to_string()))?
}

/// The asset currently holding the output device
struct ActivePlayback {
    asset: AssetId,
    generation: u64,
    shared: SharedPlaybackState,
    stream: Box<dyn DeviceStream>,
}

struct EngineActor {
    resolver: Arc<dyn AssetResolver>,
    backend: Arc<dyn OutputBackend>,
    storage: LocalStorage,
    open_source: SourceOpener,
    state: watch::Sender<PlaybackState>,
    errors: broadcast::Sender<PlaybackError>,
    events: mpsc::UnboundedSender<DeviceEvent>,
    current: Option<ActivePlayback>,
    generation: u64,
}

impl EngineActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<DeviceEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(event) = events.recv() => self.on_device_event(event).await,
            }
        }

        self.teardown().await;
        debug!("Playback engine stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Play(id, reply) => {
                let _ = reply.send(self.play(id).await);
            }
            Command::Toggle(id, reply) => {
                let result = if self.current_state() == PlaybackState::Playing(id) {
                    self.pause();
                    Ok(())
                } else {
                    self.play(id).await
                };
                let _ = reply.send(result);
            }
            Command::Pause(reply) => {
                self.pause();
                let _ = reply.send(());
            }
            Command::Resume(reply) => {
                self.resume();
                let _ = reply.send(());
            }
            Command::Stop(reply) => {
                self.teardown().await;
                let _ = reply.send(());
            }
        }
    }

    fn current_state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    async fn play(&mut self, id: AssetId) -> Result<()> {
        if self.current.as_ref().map(|c| c.asset) == Some(id) {
            self.resume();
            return Ok(());
        }

        self.teardown().await;

        let file = resolve(self.resolver.clone(), self.storage.clone(), id).await?;

        let open_source = self.open_source;
        let path = file.path.clone();
        let source = tokio::task::spawn_blocking(move || open_source(&path))
            .await
            .map_err(|e| AudioError::PlaybackFailed(e.to_string()))?
            .map_err(|e| AudioError::PlaybackFailed(format!("{}: {}", file.path.display(), e)))?;

        self.generation += 1;
        let generation = self.generation;
        let spec = OutputSpec {
            sample_rate: source.sample_rate(),
            channels: 1,
        };
        let shared = SharedPlaybackState::new(source, generation, self.events.clone());

        let backend = self.backend.clone();
        let device_state = shared.clone();
        let stream = tokio::task::spawn_blocking(move || backend.open(&spec, device_state))
            .await
            .map_err(|e| e.to_string())
            .and_then(|opened| opened)
            .map_err(|e| {
                warn!("Failed to open playback device: {}", e);
                AudioError::PlaybackFailed(e)
            })?;

        info!("Playing {} ({} Hz)", id, spec.sample_rate);
        self.current = Some(ActivePlayback {
            asset: id,
            generation,
            shared,
            stream,
        });
        self.state.send_replace(PlaybackState::Playing(id));
        Ok(())
    }

    fn pause(&mut self) {
        if let (Some(active), PlaybackState::Playing(id)) = (&self.current, self.current_state()) {
            active.shared.set_paused(true);
            self.state.send_replace(PlaybackState::Paused(id));
            debug!("Paused {} at {:.2}s", id, active.shared.current_time());
        }
    }

    fn resume(&mut self) {
        if let (Some(active), PlaybackState::Paused(id)) = (&self.current, self.current_state()) {
            active.shared.set_paused(false);
            self.state.send_replace(PlaybackState::Playing(id));
            debug!("Resumed {}", id);
        }
    }

    /// Stop and release the device, then report idle
    async fn teardown(&mut self) {
        if let Some(active) = self.current.take() {
            let ActivePlayback { asset, stream, .. } = active;
            if let Err(e) = tokio::task::spawn_blocking(move || stream.stop()).await {
                warn!("Playback device thread did not shut down cleanly: {}", e);
            }
            debug!("Released playback device for {}", asset);
        }
        self.state.send_if_modified(|state| {
            let changed = *state != PlaybackState::Idle;
            *state = PlaybackState::Idle;
            changed
        });
    }

    async fn on_device_event(&mut self, event: DeviceEvent) {
        let Some(active) = &self.current else {
            return;
        };
        if active.generation != event.generation {
            debug!("Ignoring event from finished session {}", event.generation);
            return;
        }

        let asset = active.asset;

        // Reported before the engine goes idle
        match event.kind {
            DeviceEventKind::Finished => info!("Finished playing {}", asset),
            DeviceEventKind::DecodeError(e) => {
                let _ = self.errors.send(PlaybackError {
                    asset,
                    error: AudioError::DecodeError(e),
                });
            }
        }
        self.teardown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{write_sine_wav, FakeOutput, MemoryResolver};
    use std::path::Path;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        storage: LocalStorage,
        resolver: Arc<MemoryResolver>,
        backend: Arc<FakeOutput>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let storage = LocalStorage::new(dir.path());
            Self {
                resolver: MemoryResolver::new(),
                backend: FakeOutput::new(),
                storage,
                _dir: dir,
            }
        }

        /// A take of `seconds` on disk
        fn take(&self, seconds: f32) -> AssetId {
            let file = self.storage.allocate("wav");
            write_sine_wav(&file.path, seconds, 8_000, 1);
            self.resolver.insert(&file, None);
            file.id
        }

        fn engine(&self) -> PlaybackEngine {
            PlaybackEngine::spawn(self.resolver.clone(), self.backend.clone(), self.storage.clone())
        }
    }

    /// Decodes fine for a few blocks, then breaks
    struct Corrupt(usize);

    impl SampleSource for Corrupt {
        fn sample_rate(&self) -> u32 {
            8_000
        }

        fn next_chunk(&mut self) -> std::result::Result<Option<Vec<f32>>, String> {
            if self.0 == 0 {
                return Err("bad packet".to_string());
            }
            self.0 -= 1;
            Ok(Some(vec![0.1; 80]))
        }
    }

    fn open_corrupt(_path: &Path) -> std::result::Result<Box<dyn SampleSource>, String> {
        Ok(Box::new(Corrupt(3)))
    }

    fn require_send<T: Send>(_: &T) {}

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_actor_runs_on_worker_threads() {
        let fx = Fixture::new();
        let id = fx.take(1.0);

        let (commands_tx, commands_rx) = mpsc::channel(1);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PlaybackState::Idle);
        let (errors_tx, _) = broadcast::channel(1);
        let actor = EngineActor {
            resolver: fx.resolver.clone(),
            backend: fx.backend.clone(),
            storage: fx.storage.clone(),
            open_source,
            state: state_tx,
            errors: errors_tx.clone(),
            events: events_tx,
            current: None,
            generation: 0,
        };
        let run = actor.run(commands_rx, events_rx);
        require_send(&run);
        tokio::spawn(run);

        let engine = PlaybackEngine {
            commands: commands_tx,
            state: state_rx,
            errors: errors_tx,
        };
        engine.play(id).await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing(id));
        engine.stop().await;
        assert_eq!(fx.backend.active(), 0);
    }

    #[tokio::test]
    async fn test_play_then_play_other_releases_first() {
        let fx = Fixture::new();
        let a = fx.take(5.0);
        let b = fx.take(5.0);
        let engine = fx.engine();

        engine.play(a).await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing(a));
        engine.play(b).await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing(b));

        assert_eq!(fx.backend.max_active(), 1);
        assert_eq!(fx.backend.log(), vec!["open 1", "close 1", "open 2"]);

        engine.stop().await;
        assert_eq!(fx.backend.active(), 0);
    }

    #[tokio::test]
    async fn test_state_never_shows_two_assets() {
        let fx = Fixture::new();
        let a = fx.take(5.0);
        let b = fx.take(5.0);
        let engine = fx.engine();
        let mut states = engine.watch_state();

        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                seen.push(state);
                if state == PlaybackState::Playing(b) {
                    break;
                }
            }
            seen
        });

        engine.play(a).await.unwrap();
        engine.play(b).await.unwrap();
        let seen = observer.await.unwrap();

        // Every observed value names at most one asset, and b only after a went idle
        let first_b = seen.iter().position(|s| s.asset() == Some(b)).unwrap();
        assert!(seen[first_b..].iter().all(|s| s.asset() != Some(a)));
        assert_eq!(*seen.last().unwrap(), PlaybackState::Playing(b));
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let fx = Fixture::new();
        let a = fx.take(5.0);
        let engine = fx.engine();

        engine.play(a).await.unwrap();
        engine.toggle(a).await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Paused(a));
        engine.toggle(a).await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing(a));
        // Still the same device session
        assert_eq!(fx.backend.log(), vec!["open 1"]);

        engine.stop().await;
        engine.toggle(a).await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing(a));
        engine.toggle(a).await.unwrap();
        engine.toggle(a).await.unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing(a));
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_pause_resume_stop_in_wrong_states_are_noops() {
        let fx = Fixture::new();
        let a = fx.take(5.0);
        let engine = fx.engine();

        engine.pause().await;
        engine.resume().await;
        engine.stop().await;
        engine.stop().await;
        assert_eq!(engine.state(), PlaybackState::Idle);

        engine.play(a).await.unwrap();
        engine.resume().await;
        assert_eq!(engine.state(), PlaybackState::Playing(a));
        engine.pause().await;
        engine.pause().await;
        assert_eq!(engine.state(), PlaybackState::Paused(a));
        engine.stop().await;
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_restores_blob_exactly_once() {
        let fx = Fixture::new();
        let file = fx.storage.allocate("wav");
        write_sine_wav(&file.path, 0.5, 8_000, 1);
        let bytes = std::fs::read(&file.path).unwrap();
        std::fs::remove_file(&file.path).unwrap();
        fx.resolver.insert(&file, Some(bytes.clone()));

        let engine = fx.engine();
        engine.play(file.id).await.unwrap();
        assert_eq!(std::fs::read(&file.path).unwrap(), bytes);
        assert_eq!(fx.resolver.blob_reads(), 1);

        engine.stop().await;
        engine.play(file.id).await.unwrap();
        assert_eq!(fx.resolver.blob_reads(), 1);
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_missing_bytes_are_unavailable() {
        let fx = Fixture::new();
        let file = fx.storage.allocate("m4a");
        fx.resolver.insert(&file, None);
        let engine = fx.engine();

        let err = engine.play(file.id).await.unwrap_err();
        assert!(matches!(err, AudioError::AssetUnavailable(_)));
        let err = engine.play(AssetId::new()).await.unwrap_err();
        assert!(matches!(err, AudioError::AssetUnavailable(_)));
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(fx.backend.log(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_device_failure_returns_to_idle() {
        let fx = Fixture::new();
        let a = fx.take(1.0);
        let b = fx.take(1.0);
        let engine = fx.engine();

        engine.play(a).await.unwrap();
        fx.backend.fail_next_open();
        let err = engine.play(b).await.unwrap_err();
        assert!(matches!(err, AudioError::PlaybackFailed(_)));
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert_eq!(fx.backend.active(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_file_fails_to_play() {
        let fx = Fixture::new();
        let file = fx.storage.allocate("mp3");
        std::fs::write(&file.path, b"not really an mp3").unwrap();
        fx.resolver.insert(&file, None);
        let engine = fx.engine();

        let err = engine.play(file.id).await.unwrap_err();
        assert!(matches!(err, AudioError::PlaybackFailed(_)));
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_end_of_media_goes_idle_silently() {
        let fx = Fixture::new();
        let a = fx.take(0.1);
        let engine = fx.engine();
        let mut errors = engine.errors();

        engine.play(a).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), engine.wait_idle())
            .await
            .unwrap();
        assert_eq!(fx.backend.active(), 0);
        assert!(matches!(
            errors.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_decode_error_is_reported() {
        let fx = Fixture::new();
        let a = fx.take(1.0);
        let engine = PlaybackEngine::spawn_with_decoder(
            fx.resolver.clone(),
            fx.backend.clone(),
            fx.storage.clone(),
            open_corrupt,
        );
        let mut errors = engine.errors();

        engine.play(a).await.unwrap();
        let reported = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reported.asset, a);
        assert!(matches!(reported.error, AudioError::DecodeError(_)));

        engine.wait_idle().await;
        assert_eq!(fx.backend.active(), 0);
    }

    #[test]
    fn test_pull_holds_position_while_paused() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = SharedPlaybackState::new(Box::new(Corrupt(2)), 7, tx);

        assert_eq!(state.pull(100), Pull::Samples(vec![0.1; 100]));
        state.set_paused(true);
        assert_eq!(state.pull(50), Pull::Samples(vec![0.0; 50]));
        state.set_paused(false);
        assert_eq!(state.pull(60), Pull::Samples(vec![0.1; 60]));
        assert_eq!(state.pull(100), Pull::Finished);
        assert_eq!(state.pull(100), Pull::Finished);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.generation, 7);
        assert!(matches!(event.kind, DeviceEventKind::DecodeError(_)));
        assert!(rx.try_recv().is_err());
    }
}
