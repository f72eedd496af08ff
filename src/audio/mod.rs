//! Audio capture, import and playback
//!
//! This module provides:
//! - Microphone capture into WAV takes with live level metering
//! - Importing external audio files with duration probing
//! - Single-stream playback of stored takes
//! - Device backends (PipeWire behind the `pipewire` feature)

mod capture;
mod decoder;
mod device;
mod import;
mod meter;
mod playback;
mod probe;
mod recorder;

#[cfg(feature = "pipewire")]
mod pipewire;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{
    calculate_peak, calculate_rms, CaptureConfig, CaptureSession, RecordState, SharedCaptureState,
};
pub use decoder::{open_source, PacketDecoder, SampleSource, SourceOpener};
pub use device::{default_input, default_output, DeviceStream, InputBackend, NoDevice, OutputBackend};
pub use import::{ImportPipeline, SecurityScope, Unscoped};
pub use meter::{normalize_rms, AmplitudeMeter, LevelStream, FLOOR_DB};
pub use playback::{
    AssetResolver, OutputSpec, PlaybackEngine, PlaybackError, PlaybackState, Pull,
    SharedPlaybackState,
};
pub use probe::{DurationReader, HeaderReader, MetadataReader};
pub use recorder::{duration_seconds, WavRecorder};

#[cfg(feature = "pipewire")]
pub use self::pipewire::{PipeWireInput, PipeWireOutput};
