//! Live level metering for the capture session
//!
//! A small tokio task samples the capture state's RMS level at a fixed
//! cadence, maps it to [0, 1] and broadcasts it to every level subscriber.

use super::capture::SharedCaptureState;
use log::trace;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Levels below this read as silence
pub const FLOOR_DB: f32 = -50.0;

/// Backlog kept for slow subscribers before they start skipping values
const LEVEL_BACKLOG: usize = 64;

/// Stream of normalized levels; ends when the recording stops
pub type LevelStream = Pin<Box<dyn Stream<Item = f32> + Send>>;

/// Map an RMS amplitude to [0, 1] on a decibel scale
pub fn normalize_rms(rms: f32) -> f32 {
    if !rms.is_finite() || rms <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * rms.log10();
    ((db - FLOOR_DB) / -FLOOR_DB).clamp(0.0, 1.0)
}

/// Create the channel a session publishes its levels on
pub fn level_channel() -> broadcast::Sender<f32> {
    broadcast::channel(LEVEL_BACKLOG).0
}

/// Subscribe to a level channel; lagged values are skipped
pub fn subscribe(levels: &broadcast::Sender<f32>) -> LevelStream {
    Box::pin(BroadcastStream::new(levels.subscribe()).filter_map(|level| level.ok()))
}

/// Periodic sampler behind a session's level stream
pub struct AmplitudeMeter {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AmplitudeMeter {
    /// Start sampling `source` every `interval`
    pub fn spawn(
        source: SharedCaptureState,
        interval: Duration,
        levels: broadcast::Sender<f32>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let level = normalize_rms(source.volume_level());
                        trace!("level {:.3}", level);
                        // No subscribers is fine
                        let _ = levels.send(level);
                    }
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            task,
        }
    }

    /// Stop sampling; returns once the task has released its sender
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for AmplitudeMeter {
    fn drop(&mut self) {
        self.task.abort();
    }
}
