//! Run configuration

use crate::audio::DeviceConfig;
use crate::error::CaptureError;
use crate::spectrum::TransformStrategy;

/// Everything that selects how a capture run behaves
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device identifier (`"default"`, a host device name, or a file path)
    pub device: String,

    /// Requested sample rate in Hz; the device may substitute another
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Analysis window N, in sample frames
    pub frame_size: usize,

    /// Channel fed to the transform (0 = first)
    pub channel: usize,

    pub strategy: TransformStrategy,

    /// Overruns in a row tolerated before the run is aborted
    pub max_consecutive_overruns: u32,

    /// Stop after this many reads (bounded-run mode)
    pub max_frames: Option<u64>,

    /// Bins handed to the bin-table reporter
    pub report_bins: usize,

    /// Log progress every this many reads (0 disables)
    pub progress_interval: u64,

    /// Live capture ring size in sample frames; `None` = half a second
    pub ring_frames: Option<usize>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: 44100,
            channels: 2,
            frame_size: 1024,
            channel: 0,
            strategy: TransformStrategy::Accelerated,
            max_consecutive_overruns: 8,
            max_frames: None,
            report_bins: 20,
            progress_interval: 100,
            ring_frames: None,
        }
    }
}

impl CaptureConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.frame_size == 0 {
            return Err(CaptureError::Precondition("frame size must be at least 1".to_string()));
        }
        if self.channels == 0 {
            return Err(CaptureError::Precondition("channel count must be at least 1".to_string()));
        }
        if self.channel >= self.channels as usize {
            return Err(CaptureError::Precondition(format!(
                "channel {} out of range for {} channels",
                self.channel, self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(CaptureError::Precondition("sample rate must be positive".to_string()));
        }
        if self.ring_frames == Some(0) {
            return Err(CaptureError::Precondition("ring must hold at least one frame".to_string()));
        }
        Ok(())
    }

    /// Parameters requested from the device
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(self.device.clone(), self.sample_rate, self.channels)
    }

    /// Live capture ring size, never smaller than two analysis frames
    pub fn ring_frames(&self) -> usize {
        let ring = self.ring_frames.unwrap_or(self.sample_rate as usize / 2);
        ring.max(self.frame_size * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ring_frames(), 22050);

        let device = config.device_config();
        assert_eq!(device.requested_rate, 44100);
        assert_eq!(device.channels, 2);
    }

    #[test]
    fn test_rejects_zero_frame_size() {
        let config = CaptureConfig {
            frame_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CaptureError::Precondition(_))));
    }

    #[test]
    fn test_rejects_channel_out_of_range() {
        let config = CaptureConfig {
            channels: 1,
            channel: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ring_at_least_two_frames() {
        let config = CaptureConfig {
            frame_size: 8192,
            ring_frames: Some(100),
            ..Default::default()
        };
        assert_eq!(config.ring_frames(), 16384);
    }
}
