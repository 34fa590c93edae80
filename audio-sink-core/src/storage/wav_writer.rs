use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::error::SinkError;
use crate::models::format::FormatDescriptor;
use crate::processing::wav_format::{self, WavSpec};

/// Streaming WAV file writer.
///
/// Protect with `Mutex` for cross-thread access.
///
/// ## File Format
/// ```text
/// [44-byte WAV header, sizes patched on close]
/// [raw interleaved PCM data...]
/// ```
pub struct WavWriter {
    file_path: PathBuf,
    spec: WavSpec,
    file: Option<BufWriter<File>>,
    data_bytes_written: u64,
}

impl WavWriter {
    pub fn new(file_path: PathBuf, format: &FormatDescriptor, sample_rate: u32) -> Self {
        let spec = WavSpec {
            format_code: format.format().wav_format_code(),
            channels: format.channel_count(),
            sample_rate,
            bit_depth: format.format().bit_depth().unwrap_or(16),
            data_size: 0,
        };
        Self {
            file_path,
            spec,
            file: None,
            data_bytes_written: 0,
        }
    }

    /// Create the file and write a placeholder header.
    pub fn open(&mut self) -> Result<(), SinkError> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SinkError::Storage(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&self.file_path)
            .map_err(|e| SinkError::Storage(format!("failed to create file: {}", e)))?;
        let mut file = BufWriter::new(file);

        // data size placeholder, updated on close
        let header = wav_format::generate_wav_header(&self.spec);
        file.write_all(&header)
            .map_err(|e| SinkError::Storage(format!("write failed: {}", e)))?;

        self.file = Some(file);
        self.data_bytes_written = 0;
        Ok(())
    }

    /// Append raw PCM data.
    pub fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SinkError::Storage("file is not open for writing".into()))?;
        file.write_all(data)
            .map_err(|e| SinkError::Storage(format!("write failed: {}", e)))?;
        self.data_bytes_written += data.len() as u64;
        Ok(())
    }

    /// Patch the header sizes and close the file. Idempotent.
    pub fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        let spec = WavSpec {
            data_size: u32::try_from(self.data_bytes_written).unwrap_or(u32::MAX),
            ..self.spec
        };
        let header = wav_format::generate_wav_header(&spec);

        file.seek(SeekFrom::Start(0))
            .map_err(|e| SinkError::Storage(e.to_string()))?;
        file.write_all(&header)
            .map_err(|e| SinkError::Storage(e.to_string()))?;
        file.flush().map_err(|e| SinkError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// PCM bytes written so far (excluding the header).
    pub fn data_bytes_written(&self) -> u64 {
        self.data_bytes_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl Drop for WavWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to finalize {}: {}", self.file_path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("audio_sink_test_{}", name))
    }

    #[test]
    fn write_plain_wav() {
        let path = temp_file_path("writer_plain.wav");
        let format = FormatDescriptor::new(2, 16, false).unwrap();

        let mut writer = WavWriter::new(path.clone(), &format, 48000);
        writer.open().unwrap();
        writer.write(&[0u8; 16]).unwrap();
        writer.close().unwrap();
        assert!(!writer.is_open());

        let file_data = fs::read(&path).unwrap();
        assert_eq!(file_data.len(), 44 + 16);

        let spec = wav_format::parse_wav_header(&file_data).unwrap();
        assert_eq!(spec.data_size, 16);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.format_code, 1);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn float_header() {
        let path = temp_file_path("writer_float.wav");
        let format = FormatDescriptor::new(1, 32, true).unwrap();

        let mut writer = WavWriter::new(path.clone(), &format, 44100);
        writer.open().unwrap();
        writer.write(&1.0f32.to_le_bytes()).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        let spec = wav_format::parse_wav_header(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(spec.format_code, 3);
        assert_eq!(spec.bit_depth, 32);
        assert_eq!(spec.data_size, 4);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn write_before_open_fails() {
        let format = FormatDescriptor::new(2, 16, false).unwrap();
        let mut writer = WavWriter::new(temp_file_path("never_opened.wav"), &format, 48000);
        assert!(matches!(writer.write(&[0; 4]), Err(SinkError::Storage(_))));
    }
}
