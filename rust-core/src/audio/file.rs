//! Finite capture sources
//!
//! Pre-recorded input behaves like a device that never overruns: each read
//! returns as many whole sample frames as remain, and zero frames once the
//! stream is exhausted.

use hound::WavReader;
use log::warn;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use super::device::{AccessMode, PcmDevice, SampleFormat};
use crate::error::{CaptureError, DeviceError, SetupStage};

fn planar_rejected() -> DeviceError {
    DeviceError::Unsupported("files are read interleaved".to_string())
}

/// Headerless S16LE interleaved capture (as written by `record`)
pub struct RawFileSource<R> {
    name: String,
    reader: R,
    channels: u16,
    scratch: Vec<u8>,
}

impl RawFileSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CaptureError::DeviceUnavailable {
            device: path.display().to_string(),
            stage: SetupStage::Open,
            reason: e.to_string(),
        })?;
        Ok(Self::new(path.display().to_string(), BufReader::new(file)))
    }
}

impl<R: Read> RawFileSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
            channels: 0,
            scratch: Vec::new(),
        }
    }

    /// Fill `scratch[..wanted]` as far as the reader allows
    fn fill(&mut self, wanted: usize) -> Result<usize, DeviceError> {
        let mut filled = 0;
        while filled < wanted {
            match self.reader.read(&mut self.scratch[filled..wanted]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(DeviceError::Io(e.to_string())),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> PcmDevice for RawFileSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_access(&mut self, access: AccessMode) -> Result<(), DeviceError> {
        match access {
            AccessMode::Interleaved => Ok(()),
            AccessMode::Planar => Err(planar_rejected()),
        }
    }

    fn set_format(&mut self, format: SampleFormat) -> Result<(), DeviceError> {
        match format {
            SampleFormat::S16Le => Ok(()),
        }
    }

    fn set_channels(&mut self, channels: u16) -> Result<(), DeviceError> {
        if channels == 0 {
            return Err(DeviceError::Unsupported("zero channels".to_string()));
        }
        self.channels = channels;
        Ok(())
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32, DeviceError> {
        // No header to contradict the caller
        Ok(rate)
    }

    fn apply(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn read_interleaved(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceError> {
        let channels = self.channels.max(1) as usize;
        let frame_bytes = SampleFormat::S16Le.bytes_per_sample() * channels;
        let wanted = buffer.len() / channels * frame_bytes;
        if self.scratch.len() < wanted {
            self.scratch.resize(wanted, 0);
        }

        let filled = self.fill(wanted)?;
        let frames = filled / frame_bytes;
        let leftover = filled % frame_bytes;
        if leftover > 0 {
            warn!(
                "{}: discarding {} trailing bytes of an incomplete sample frame",
                self.name, leftover
            );
        }

        for (dst, bytes) in buffer
            .iter_mut()
            .zip(self.scratch[..frames * frame_bytes].chunks_exact(2))
        {
            *dst = i16::from_le_bytes([bytes[0], bytes[1]]);
        }

        Ok(frames)
    }

    fn close(&mut self) {}
}

/// 16 bit integer PCM WAV input
///
/// The header decides the rate and channel count; negotiation only checks
/// that the request is compatible.
pub struct WavSource<R: Read> {
    name: String,
    reader: WavReader<R>,
}

impl WavSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let reader = WavReader::open(path).map_err(|e| CaptureError::DeviceUnavailable {
            device: path.display().to_string(),
            stage: SetupStage::Open,
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: path.display().to_string(),
            reader,
        })
    }
}

impl<R: Read> WavSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Result<Self, CaptureError> {
        let name = name.into();
        let reader = WavReader::new(reader).map_err(|e| CaptureError::DeviceUnavailable {
            device: name.clone(),
            stage: SetupStage::Open,
            reason: e.to_string(),
        })?;
        Ok(Self { name, reader })
    }

    pub fn spec(&self) -> hound::WavSpec {
        self.reader.spec()
    }
}

impl<R: Read> PcmDevice for WavSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_access(&mut self, access: AccessMode) -> Result<(), DeviceError> {
        match access {
            AccessMode::Interleaved => Ok(()),
            AccessMode::Planar => Err(planar_rejected()),
        }
    }

    fn set_format(&mut self, format: SampleFormat) -> Result<(), DeviceError> {
        let spec = self.reader.spec();
        let matches = match format {
            SampleFormat::S16Le => {
                spec.sample_format == hound::SampleFormat::Int && spec.bits_per_sample == 16
            }
        };
        if !matches {
            return Err(DeviceError::Unsupported(format!(
                "file holds {}-bit {:?} samples",
                spec.bits_per_sample, spec.sample_format
            )));
        }
        Ok(())
    }

    fn set_channels(&mut self, channels: u16) -> Result<(), DeviceError> {
        let available = self.reader.spec().channels;
        if channels != available {
            return Err(DeviceError::Unsupported(format!(
                "file has {} channels, {} requested",
                available, channels
            )));
        }
        Ok(())
    }

    fn set_rate_near(&mut self, _rate: u32) -> Result<u32, DeviceError> {
        Ok(self.reader.spec().sample_rate)
    }

    fn apply(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn read_interleaved(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceError> {
        let channels = self.reader.spec().channels.max(1) as usize;
        let wanted = buffer.len() / channels * channels;

        let mut n = 0;
        let mut samples = self.reader.samples::<i16>();
        while n < wanted {
            match samples.next() {
                Some(Ok(sample)) => {
                    buffer[n] = sample;
                    n += 1;
                }
                Some(Err(e)) => return Err(DeviceError::Io(e.to_string())),
                None => break,
            }
        }

        Ok(n / channels)
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn raw_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_raw_source_reads_whole_frames_then_eof() {
        // 5 stereo frames
        let samples: Vec<i16> = (0..10).map(|i| i * 100 - 500).collect();
        let mut source = RawFileSource::new("mem", Cursor::new(raw_bytes(&samples)));
        source.set_channels(2).unwrap();

        let mut buffer = vec![0i16; 8];
        assert_eq!(source.read_interleaved(&mut buffer).unwrap(), 4);
        assert_eq!(buffer, samples[..8]);

        let frames = source.read_interleaved(&mut buffer).unwrap();
        assert_eq!(frames, 1);
        assert_eq!(buffer[..2], samples[8..10]);

        assert_eq!(source.read_interleaved(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_raw_source_drops_incomplete_frame() {
        // One full stereo frame plus a dangling byte
        let mut bytes = raw_bytes(&[1, 2]);
        bytes.push(0x7f);
        let mut source = RawFileSource::new("mem", Cursor::new(bytes));
        source.set_channels(2).unwrap();

        let mut buffer = vec![0i16; 4];
        assert_eq!(source.read_interleaved(&mut buffer).unwrap(), 1);
        assert_eq!(source.read_interleaved(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_raw_source_rejects_planar_and_zero_channels() {
        let mut source = RawFileSource::new("mem", Cursor::new(Vec::new()));
        assert!(source.set_access(AccessMode::Planar).is_err());
        assert!(source.set_channels(0).is_err());
        assert_eq!(source.set_rate_near(22050).unwrap(), 22050);
    }

    fn wav_fixture(spec: hound::WavSpec, samples: &[i16]) -> Cursor<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn test_wav_source_substitutes_header_rate() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples: Vec<i16> = (0..6).collect();
        let mut source = WavSource::new("mem.wav", wav_fixture(spec, &samples)).unwrap();

        source.set_format(SampleFormat::S16Le).unwrap();
        source.set_channels(1).unwrap();
        assert!(source.set_channels(2).is_err());
        assert_eq!(source.set_rate_near(44100).unwrap(), 16000);

        let mut buffer = vec![0i16; 4];
        assert_eq!(source.read_interleaved(&mut buffer).unwrap(), 4);
        assert_eq!(buffer, vec![0, 1, 2, 3]);
        assert_eq!(source.read_interleaved(&mut buffer).unwrap(), 2);
        assert_eq!(source.read_interleaved(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_wav_source_rejects_float_samples() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.5f32).unwrap();
            writer.finalize().unwrap();
        }
        cursor.set_position(0);

        let mut source = WavSource::new("float.wav", cursor).unwrap();
        assert!(source.set_format(SampleFormat::S16Le).is_err());
    }
}
