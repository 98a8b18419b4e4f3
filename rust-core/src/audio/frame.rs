//! Raw capture frames and conversion to a normalized signal

use super::device::SampleFormat;
use crate::error::CaptureError;

/// One window of interleaved fixed-point samples
///
/// The buffer always holds `frame_size * channels` samples; only the first
/// `valid_frames` sample frames carry data from the last read.
#[derive(Debug, Clone)]
pub struct RawFrame {
    samples: Vec<i16>,
    bytes: Vec<u8>,
    frame_size: usize,
    channels: usize,
    valid_frames: usize,
}

impl RawFrame {
    /// Allocate a frame buffer, reporting allocation failure instead of aborting
    pub fn try_new(frame_size: usize, channels: usize) -> Result<Self, CaptureError> {
        let len = frame_size
            .checked_mul(channels)
            .ok_or_else(|| CaptureError::Allocation(format!("{} x {} sample frame", frame_size, channels)))?;

        let mut samples = Vec::new();
        samples
            .try_reserve_exact(len)
            .map_err(|e| CaptureError::Allocation(format!("capture buffer of {} samples ({})", len, e)))?;
        samples.resize(len, 0);

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len * SampleFormat::S16Le.bytes_per_sample())
            .map_err(|e| CaptureError::Allocation(format!("sink buffer ({})", e)))?;

        Ok(Self {
            samples,
            bytes,
            frame_size,
            channels,
            valid_frames: 0,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn valid_frames(&self) -> usize {
        self.valid_frames
    }

    pub fn is_short(&self) -> bool {
        self.valid_frames < self.frame_size
    }

    /// Record how many sample frames the last read delivered
    pub fn set_valid_frames(&mut self, frames: usize) {
        assert!(frames <= self.frame_size, "read delivered more frames than requested");
        self.valid_frames = frames;
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    /// Mean level of the valid samples across all channels, in percent
    pub fn level(&self) -> f64 {
        mean_level(&self.samples[..self.valid_frames * self.channels], SampleFormat::S16Le)
    }

    /// Valid samples serialized as little-endian bytes
    ///
    /// Reuses an internal buffer; the slice is only valid until the next call.
    pub fn le_bytes(&mut self) -> &[u8] {
        let valid = self.valid_frames * self.channels;
        self.bytes.clear();
        for sample in &self.samples[..valid] {
            self.bytes.extend_from_slice(&sample.to_le_bytes());
        }
        &self.bytes
    }
}

/// Extract one channel and normalize it into `signal`
///
/// Positions at or beyond `valid_frames` are set to exactly 0.0, so the
/// transform always sees `signal.len()` samples.
///
/// # Arguments
/// * `raw` - Interleaved samples, at least `signal.len() * channels` long
/// * `valid_frames` - Sample frames in `raw` that hold captured data
/// * `channels` - Interleaved channel count
/// * `channel` - Channel to extract (0 = first)
/// * `format` - Sample format, for the full-scale divisor
/// * `signal` - Output, one value per frame
///
/// # Panics
/// On inconsistent arguments; these are caller bugs.
pub fn convert(
    raw: &[i16],
    valid_frames: usize,
    channels: usize,
    channel: usize,
    format: SampleFormat,
    signal: &mut [f64],
) {
    assert!(channels > 0, "channel count must be positive");
    assert!(channel < channels, "channel {} out of range for {} channels", channel, channels);
    assert!(valid_frames <= signal.len(), "more valid frames than signal length");
    assert!(raw.len() >= valid_frames * channels, "raw buffer shorter than valid frames");

    let scale = format.full_scale();
    let (head, tail) = signal.split_at_mut(valid_frames);
    for (out, frame) in head.iter_mut().zip(raw.chunks_exact(channels)) {
        *out = frame[channel] as f64 / scale;
    }
    tail.fill(0.0);
}

/// Mean absolute amplitude as a percentage of full scale
///
/// 0.0 for silence (or no samples), 100.0 when every sample is at
/// `i16::MIN`.
pub fn mean_level(samples: &[i16], format: SampleFormat) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|s| s.unsigned_abs() as u64).sum();
    sum as f64 / samples.len() as f64 * 100.0 / format.full_scale()
}

/// Convert a `RawFrame` into `signal` using its own geometry
pub fn convert_frame(frame: &RawFrame, channel: usize, signal: &mut [f64]) {
    convert(
        frame.samples(),
        frame.valid_frames(),
        frame.channels(),
        channel,
        SampleFormat::S16Le,
        signal,
    );
}
