//! Duration probing
//!
//! Two readers with different failure modes: container metadata through
//! symphonia, and the raw WAV header through hound.

use super::decoder::{audio_track, open_format};
use super::recorder::duration_seconds;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::units::TimeBase;
use std::path::Path;

/// Reads a duration in seconds from a local file
pub trait DurationReader: Send + Sync + 'static {
    fn read(&self, path: &Path) -> Result<f64, String>;
}

/// A duration worth storing
pub fn is_usable(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}

/// Container metadata via symphonia
///
/// Uses the track's frame count when the container declares one and sums
/// packet durations otherwise.
pub struct MetadataReader;

impl DurationReader for MetadataReader {
    fn read(&self, path: &Path) -> Result<f64, String> {
        let mut format = open_format(path)?;
        let track = audio_track(format.as_ref())?;
        let params = &track.codec_params;

        let time_base = params
            .time_base
            .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
            .ok_or_else(|| "No time base or sample rate".to_string())?;

        let frames = match params.n_frames {
            Some(n_frames) => n_frames,
            None => {
                let mut total = 0u64;
                loop {
                    match format.next_packet() {
                        Ok(packet) if packet.track_id() == track.id => total += packet.dur,
                        Ok(_) => {}
                        Err(SymphoniaError::IoError(ref e))
                            if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                        {
                            break
                        }
                        Err(e) => return Err(format!("Error scanning packets: {}", e)),
                    }
                }
                total
            }
        };

        let time = time_base.calc_time(frames);
        Ok(time.seconds as f64 + time.frac)
    }
}

/// WAV header via hound: frame count over sample rate
pub struct HeaderReader;

impl DurationReader for HeaderReader {
    fn read(&self, path: &Path) -> Result<f64, String> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| format!("Failed to read WAV header: {}", e))?;
        let sample_rate = reader.spec().sample_rate;
        if sample_rate == 0 {
            return Err("Header declares no sample rate".to_string());
        }
        Ok(duration_seconds(reader.duration() as u64, sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::write_sine_wav;

    #[test]
    fn test_readers_agree_on_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1.5, 16_000, 1);

        let metadata = MetadataReader.read(&path).unwrap();
        let header = HeaderReader.read(&path).unwrap();
        assert!((metadata - 1.5).abs() < 0.01, "{}", metadata);
        assert!((header - 1.5).abs() < 1e-9, "{}", header);
    }

    #[test]
    fn test_readers_reject_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, [0u8; 64]).unwrap();

        assert!(MetadataReader.read(&path).is_err());
        assert!(HeaderReader.read(&path).is_err());
    }

    #[test]
    fn test_usable_durations() {
        assert!(is_usable(0.01));
        assert!(!is_usable(0.0));
        assert!(!is_usable(f64::NAN));
        assert!(!is_usable(f64::INFINITY));
        assert!(!is_usable(-1.0));
    }
}
