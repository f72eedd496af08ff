//! Streaming audio decoder using symphonia
//!
//! Decodes one packet at a time and downmixes to mono, so playback can start
//! immediately and a corrupt packet surfaces while playing.

use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Pull-based source of mono f32 samples
pub trait SampleSource: Send {
    fn sample_rate(&self) -> u32;

    /// Next block of samples; `Ok(None)` at end of media
    fn next_chunk(&mut self) -> Result<Option<Vec<f32>>, String>;
}

/// Opens a decoder for a local file
pub type SourceOpener = fn(&Path) -> Result<Box<dyn SampleSource>, String>;

/// Default opener backed by symphonia
pub fn open_source(path: &Path) -> Result<Box<dyn SampleSource>, String> {
    Ok(Box::new(PacketDecoder::open(path)?))
}

/// Open a file with symphonia's probe, using the extension as a hint
pub(crate) fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, String> {
    let file = File::open(path)
        .map_err(|e| format!("Failed to open file {}: {}", path.display(), e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("Failed to probe format: {}", e))?;

    Ok(probed.format)
}

/// First track with a real codec
pub(crate) fn audio_track(format: &dyn FormatReader) -> Result<Track, String> {
    format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .cloned()
        .ok_or_else(|| "No audio track found".to_string())
}

/// Packet-at-a-time decoder for one file
pub struct PacketDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

impl PacketDecoder {
    pub fn open(path: &Path) -> Result<Self, String> {
        let format = open_format(path)?;
        let track = audio_track(format.as_ref())?;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| "Sample rate not found".to_string())?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| format!("Failed to create decoder: {}", e))?;

        log::debug!(
            "Opened {} for playback: {} Hz, codec {:?}",
            path.display(),
            sample_rate,
            track.codec_params.codec
        );

        Ok(Self {
            format,
            decoder,
            track_id: track.id,
            sample_rate,
        })
    }
}

impl SampleSource for PacketDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_chunk(&mut self) -> Result<Option<Vec<f32>>, String> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(format!("Error reading packet: {}", e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| format!("Decode error: {}", e))?;

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);

            let mono: Vec<f32> = buffer
                .samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect();

            if mono.is_empty() {
                continue;
            }
            return Ok(Some(mono));
        }
    }
}
