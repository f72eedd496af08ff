//! PipeWire device backends
//!
//! Each stream runs its own PipeWire main loop on a dedicated thread. `open`
//! waits until the stream is connected; `stop` quits the loop and joins.

use super::capture::{CaptureConfig, SharedCaptureState};
use super::device::{DeviceStream, InputBackend, OutputBackend};
use super::playback::{OutputSpec, Pull, SharedPlaybackState};
use log::{debug, warn};
use ::pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

const APP_NAME: &str = "Takebook";
const SAMPLE_SIZE: usize = std::mem::size_of::<f32>();

enum PipeWireCommand {
    Stop,
}

type Ready = mpsc::Sender<Result<(), String>>;

/// A running PipeWire stream thread
struct PipeWireStream {
    sender: pw::channel::Sender<PipeWireCommand>,
    thread: JoinHandle<()>,
}

impl PipeWireStream {
    /// Spawn a loop thread and wait for it to connect or fail
    fn spawn<F>(name: &'static str, run: F) -> Result<Self, String>
    where
        F: FnOnce(pw::channel::Receiver<PipeWireCommand>, Ready) -> Result<(), String>
            + Send
            + 'static,
    {
        let (sender, receiver) = pw::channel::channel::<PipeWireCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let failed = ready_tx.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if let Err(e) = run(receiver, ready_tx) {
                    warn!("{} loop failed: {}", name, e);
                    let _ = failed.send(Err(e));
                }
            })
            .map_err(|e| format!("Failed to spawn {} thread: {}", name, e))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!("{} stream connected", name);
                Ok(Self { sender, thread })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(format!("{} thread exited before connecting", name))
            }
        }
    }
}

impl DeviceStream for PipeWireStream {
    fn stop(self: Box<Self>) {
        // The loop may already have quit on its own at end of media
        let _ = self.sender.send(PipeWireCommand::Stop);
        if self.thread.join().is_err() {
            warn!("PipeWire thread panicked");
        }
    }
}

/// Default microphone through PipeWire
pub struct PipeWireInput;

impl InputBackend for PipeWireInput {
    fn open(
        &self,
        config: &CaptureConfig,
        sink: SharedCaptureState,
    ) -> Result<Box<dyn DeviceStream>, String> {
        let rate = config.sample_rate;
        let stream = PipeWireStream::spawn("takebook-capture", move |receiver, ready| {
            run_capture_loop(sink, rate, receiver, ready)
        })?;
        Ok(Box::new(stream))
    }
}

/// Default speaker through PipeWire
pub struct PipeWireOutput;

impl OutputBackend for PipeWireOutput {
    fn open(
        &self,
        spec: &OutputSpec,
        source: SharedPlaybackState,
    ) -> Result<Box<dyn DeviceStream>, String> {
        let spec = *spec;
        let stream = PipeWireStream::spawn("takebook-playback", move |receiver, ready| {
            run_playback_loop(source, spec, receiver, ready)
        })?;
        Ok(Box::new(stream))
    }
}

/// Serialized F32LE format pod for `rate` and `channels`
fn format_pod(rate: u32, channels: u32) -> Result<Vec<u8>, String> {
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(rate);
    audio_info.set_channels(channels);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    Ok(spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner())
}

/// Update `format` when the negotiated format is raw audio
fn on_param_changed(format: &mut spa::param::audio::AudioInfoRaw, id: u32, param: Option<&Pod>) {
    let Some(param) = param else { return };
    if id != spa::param::ParamType::Format.as_raw() {
        return;
    }

    let (media_type, media_subtype) = match format_utils::parse_format(param) {
        Ok(v) => v,
        Err(_) => return,
    };

    if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
        return;
    }

    if let Err(e) = format.parse(param) {
        warn!("Failed to parse audio format: {:?}", e);
    }
}

fn run_capture_loop(
    state: SharedCaptureState,
    rate: u32,
    receiver: pw::channel::Receiver<PipeWireCommand>,
    ready: Ready,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        state: SharedCaptureState,
        requested_rate: u32,
    }

    let user_data = UserData {
        format: Default::default(),
        state,
        requested_rate: rate,
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Production",
        *pw::keys::APP_NAME => APP_NAME,
    };

    let stream = pw::stream::StreamBox::new(&core, "takebook-capture", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            on_param_changed(&mut user_data.format, id, param);
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let sample_rate = match user_data.format.rate() {
                0 => user_data.requested_rate,
                rate => rate,
            };
            let n_bytes = data.chunk().size() as usize;

            if let Some(raw) = data.data() {
                let raw = &raw[..n_bytes.min(raw.len())];
                // Keep the first channel of each frame
                let mono: Vec<f32> = raw
                    .chunks_exact(SAMPLE_SIZE * n_channels)
                    .map(|frame| f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]))
                    .collect();
                user_data.state.process_samples(&mono, sample_rate);
            }
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    let values = format_pod(rate, 1)?;
    let pod = Pod::from_bytes(&values).ok_or_else(|| "Invalid audio format pod".to_string())?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    let _ = ready.send(Ok(()));
    mainloop.run();

    Ok(())
}

fn run_playback_loop(
    state: SharedPlaybackState,
    spec: OutputSpec,
    receiver: pw::channel::Receiver<PipeWireCommand>,
    ready: Ready,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        state: SharedPlaybackState,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    let user_data = UserData {
        format: Default::default(),
        state,
        mainloop_weak: mainloop.downgrade(),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Music",
        *pw::keys::APP_NAME => APP_NAME,
    };

    let stream = pw::stream::StreamBox::new(&core, "takebook-playback", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            on_param_changed(&mut user_data.format, id, param);
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let stride = SAMPLE_SIZE * n_channels;

            let Some(slice) = data.data() else {
                return;
            };
            let n_frames = slice.len() / stride;

            match user_data.state.pull(n_frames) {
                Pull::Samples(samples) => {
                    for (frame, &sample) in slice.chunks_exact_mut(stride).zip(samples.iter()) {
                        let bytes = sample.to_le_bytes();
                        for channel in frame.chunks_exact_mut(SAMPLE_SIZE) {
                            channel.copy_from_slice(&bytes);
                        }
                    }
                    let written = samples.len() * stride;
                    if written < slice.len() {
                        slice[written..].fill(0);
                    }

                    let chunk = data.chunk_mut();
                    *chunk.offset_mut() = 0;
                    *chunk.stride_mut() = stride as i32;
                    *chunk.size_mut() = written as u32;
                }
                Pull::Finished => {
                    if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                        mainloop.quit();
                    }
                }
            }
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    let values = format_pod(spec.sample_rate, spec.channels as u32)?;
    let pod = Pod::from_bytes(&values).ok_or_else(|| "Invalid audio format pod".to_string())?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    let _ = ready.send(Ok(()));
    mainloop.run();

    Ok(())
}
