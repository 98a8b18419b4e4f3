//! Capture device abstraction
//!
//! A `PcmDevice` is anything that can be negotiated into delivering
//! interleaved fixed-point sample frames: a live input through cpal, a raw
//! capture file, or a WAV file.

use crate::error::DeviceError;

/// Fixed-point sample formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16 bit, little-endian
    S16Le,
}

impl SampleFormat {
    /// Bytes per sample for one channel
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
        }
    }

    /// Magnitude that maps to 1.0 after normalization
    pub fn full_scale(&self) -> f64 {
        match self {
            SampleFormat::S16Le => 32768.0,
        }
    }
}

/// Buffer layout for multi-channel reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// L R L R ...
    Interleaved,
    /// One contiguous block per channel
    Planar,
}

/// Device parameters, requested and negotiated
///
/// `sample_rate` starts out equal to `requested_rate` and is replaced by
/// whatever the device agreed to. Frequency labels must use `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub device: String,
    pub requested_rate: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub access: AccessMode,
}

impl DeviceConfig {
    pub fn new(device: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            device: device.into(),
            requested_rate: sample_rate,
            sample_rate,
            channels,
            format: SampleFormat::S16Le,
            access: AccessMode::Interleaved,
        }
    }

    /// Bytes in one interleaved sample frame
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// True when the device substituted a different rate
    pub fn rate_substituted(&self) -> bool {
        self.sample_rate != self.requested_rate
    }
}

/// Low-level capture backend
///
/// Negotiation methods are called in the order access, format, channels,
/// rate, then `apply`. `read_interleaved` fills `buffer` with whole sample
/// frames and returns how many it delivered; zero means the source is
/// exhausted.
pub trait PcmDevice {
    fn name(&self) -> &str;

    fn set_access(&mut self, access: AccessMode) -> Result<(), DeviceError>;

    fn set_format(&mut self, format: SampleFormat) -> Result<(), DeviceError>;

    fn set_channels(&mut self, channels: u16) -> Result<(), DeviceError>;

    /// Request a rate; returns the nearest rate the device supports
    fn set_rate_near(&mut self, rate: u32) -> Result<u32, DeviceError>;

    /// Commit negotiated parameters
    fn apply(&mut self) -> Result<(), DeviceError>;

    /// Make the stream ready to deliver samples (also clears an overrun)
    fn prepare(&mut self) -> Result<(), DeviceError>;

    fn read_interleaved(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceError>;

    fn close(&mut self);
}
