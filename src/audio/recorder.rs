//! WAV file recording using hound
//!
//! Takes are written incrementally while the device delivers samples, as
//! 32-bit float mono WAV at the capture sample rate.

use hound::{WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Incremental WAV writer for one take
pub struct WavRecorder {
    writer: WavWriter<BufWriter<File>>,
    path: PathBuf,
    frames: u64,
}

impl WavRecorder {
    /// WAV format used for every recording
    pub fn spec(sample_rate: u32) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    /// Create the file and write its header
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create recordings directory: {}", e))?;
        }

        let writer = WavWriter::create(path, Self::spec(sample_rate))
            .map_err(|e| format!("Failed to create WAV writer: {}", e))?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            frames: 0,
        })
    }

    /// Append mono samples
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<(), String> {
        for &sample in samples {
            self.writer
                .write_sample(sample)
                .map_err(|e| format!("Failed to write sample: {}", e))?;
        }
        self.frames += samples.len() as u64;
        Ok(())
    }

    /// Rate written into the header
    pub fn sample_rate(&self) -> u32 {
        self.writer.spec().sample_rate
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Patch the header lengths and flush
    pub fn finalize(self) -> Result<PathBuf, String> {
        self.writer
            .finalize()
            .map_err(|e| format!("Failed to finalize WAV file: {}", e))?;
        Ok(self.path)
    }
}

/// Get duration of a frame count in seconds
pub fn duration_seconds(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_calculation() {
        assert_eq!(duration_seconds(16000, 16000), 1.0);
        assert_eq!(duration_seconds(32000, 16000), 2.0);
        assert_eq!(duration_seconds(8000, 16000), 0.5);
        assert_eq!(duration_seconds(8000, 0), 0.0);
    }

    #[test]
    fn test_written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");

        let mut recorder = WavRecorder::create(&path, 8000).unwrap();
        recorder.write_samples(&[0.25; 4000]).unwrap();
        recorder.write_samples(&[-0.25; 4000]).unwrap();
        assert_eq!(recorder.frames_written(), 8000);
        let saved = recorder.finalize().unwrap();

        let reader = hound::WavReader::open(&saved).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.duration(), 8000);
    }
}
