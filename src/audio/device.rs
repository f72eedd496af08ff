//! Audio device backends
//!
//! Capture and playback talk to hardware through these traits. Opening a
//! stream blocks until the device is configured (or has failed); stopping it
//! blocks until the device thread has exited and released the hardware.

use super::capture::{CaptureConfig, SharedCaptureState};
use super::playback::{OutputSpec, SharedPlaybackState};
use std::sync::Arc;

/// A running device stream owned by exactly one session
pub trait DeviceStream: Send {
    /// Halt the device and wait for it to be released
    fn stop(self: Box<Self>);
}

/// Microphone side
pub trait InputBackend: Send + Sync + 'static {
    /// Start delivering samples into `sink`
    fn open(
        &self,
        config: &CaptureConfig,
        sink: SharedCaptureState,
    ) -> Result<Box<dyn DeviceStream>, String>;
}

/// Speaker side
pub trait OutputBackend: Send + Sync + 'static {
    /// Start pulling samples from `source`
    fn open(
        &self,
        spec: &OutputSpec,
        source: SharedPlaybackState,
    ) -> Result<Box<dyn DeviceStream>, String>;
}

/// Backend used when the binary was built without any audio system
pub struct NoDevice;

const NO_DEVICE: &str = "built without an audio backend (enable the `pipewire` feature)";

impl InputBackend for NoDevice {
    fn open(
        &self,
        _config: &CaptureConfig,
        _sink: SharedCaptureState,
    ) -> Result<Box<dyn DeviceStream>, String> {
        Err(NO_DEVICE.to_string())
    }
}

impl OutputBackend for NoDevice {
    fn open(
        &self,
        _spec: &OutputSpec,
        _source: SharedPlaybackState,
    ) -> Result<Box<dyn DeviceStream>, String> {
        Err(NO_DEVICE.to_string())
    }
}

/// Default capture backend for this build
pub fn default_input() -> Arc<dyn InputBackend> {
    #[cfg(feature = "pipewire")]
    {
        Arc::new(super::pipewire::PipeWireInput)
    }
    #[cfg(not(feature = "pipewire"))]
    {
        Arc::new(NoDevice)
    }
}

/// Default playback backend for this build
pub fn default_output() -> Arc<dyn OutputBackend> {
    #[cfg(feature = "pipewire")]
    {
        Arc::new(super::pipewire::PipeWireOutput)
    }
    #[cfg(not(feature = "pipewire"))]
    {
        Arc::new(NoDevice)
    }
}
