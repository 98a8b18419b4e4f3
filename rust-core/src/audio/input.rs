//! Live audio capture using cpal
//!
//! Negotiation narrows the device's supported input configurations one
//! parameter at a time. Once applied, the cpal callback feeds a sample ring
//! and `read_interleaved` blocks on the other end of it.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, SupportedStreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::buffer::{SampleConsumer, SampleRing};
use super::device::{AccessMode, PcmDevice, SampleFormat};
use crate::error::{CaptureError, DeviceError, SetupStage};

/// Back-off between polls of an empty ring
const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Audio input device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Capture device backed by a cpal input stream
pub struct CpalDevice {
    name: String,
    device: Device,
    candidates: Vec<SupportedStreamConfigRange>,
    chosen: Option<SupportedStreamConfig>,
    channels: u16,
    ring_frames: usize,
    stream: Option<Stream>,
    consumer: Option<SampleConsumer>,
    stream_error: Arc<Mutex<Option<String>>>,
}

impl CpalDevice {
    /// Open an input device by name
    ///
    /// # Arguments
    /// * `name` - Device name as reported by the host, or `"default"`
    /// * `ring_frames` - Sample frames buffered between callback and reader
    pub fn open(name: &str, ring_frames: usize) -> Result<Self, CaptureError> {
        let unavailable = |reason: String| CaptureError::DeviceUnavailable {
            device: name.to_string(),
            stage: SetupStage::Open,
            reason,
        };

        let host = cpal::default_host();
        let device = if name == "default" {
            host.default_input_device()
                .ok_or_else(|| unavailable("no default input device".to_string()))?
        } else {
            host.input_devices()
                .map_err(|e| unavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| unavailable("no input device with this name".to_string()))?
        };

        let candidates: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| unavailable(e.to_string()))?
            .collect();

        info!("audio interface opened: {} ({} configurations)", name, candidates.len());

        Ok(Self {
            name: name.to_string(),
            device,
            candidates,
            chosen: None,
            channels: 0,
            ring_frames: ring_frames.max(1),
            stream: None,
            consumer: None,
            stream_error: Arc::new(Mutex::new(None)),
        })
    }

    fn take_stream_error(&self) -> Option<String> {
        self.stream_error.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl PcmDevice for CpalDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_access(&mut self, access: AccessMode) -> Result<(), DeviceError> {
        match access {
            AccessMode::Interleaved => Ok(()),
            AccessMode::Planar => Err(DeviceError::Unsupported(
                "cpal only delivers interleaved buffers".to_string(),
            )),
        }
    }

    fn set_format(&mut self, format: SampleFormat) -> Result<(), DeviceError> {
        let wanted = match format {
            SampleFormat::S16Le => cpal::SampleFormat::I16,
        };
        self.candidates.retain(|c| c.sample_format() == wanted);
        if self.candidates.is_empty() {
            return Err(DeviceError::Unsupported(format!("no {:?} capture configuration", format)));
        }
        Ok(())
    }

    fn set_channels(&mut self, channels: u16) -> Result<(), DeviceError> {
        self.candidates.retain(|c| c.channels() == channels);
        if self.candidates.is_empty() {
            return Err(DeviceError::Unsupported(format!("{} channels not supported", channels)));
        }
        self.channels = channels;
        Ok(())
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32, DeviceError> {
        let ranges = self
            .candidates
            .iter()
            .map(|range| (range.min_sample_rate().0, range.max_sample_rate().0));
        let (index, actual) = nearest_rate(rate, ranges)
            .ok_or_else(|| DeviceError::Unsupported("no configuration left to pick a rate from".to_string()))?;

        self.chosen = Some(self.candidates[index].clone().with_sample_rate(SampleRate(actual)));
        Ok(actual)
    }

    fn apply(&mut self) -> Result<(), DeviceError> {
        let chosen = self
            .chosen
            .as_ref()
            .ok_or_else(|| DeviceError::Unsupported("rate was never negotiated".to_string()))?;
        let stream_config = chosen.config();

        let ring = SampleRing::new(self.ring_frames * self.channels as usize);
        let (mut producer, consumer) = ring.split();

        let error_slot = Arc::clone(&self.stream_error);
        let stream = self
            .device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    producer.write(data);
                },
                move |err| {
                    error!("Audio input error: {}", err);
                    if let Ok(mut slot) = error_slot.lock() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| DeviceError::Io(e.to_string()))?;

        // Some backends start streaming on build; hold off until prepare
        if let Err(e) = stream.pause() {
            debug!("stream pause not supported: {}", e);
        }

        self.stream = Some(stream);
        self.consumer = Some(consumer);
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        let consumer = self
            .consumer
            .as_mut()
            .ok_or_else(|| DeviceError::Io("stream not built".to_string()))?;
        let dropped = consumer.reset();
        if dropped > 0 {
            debug!("discarded {} stale samples", dropped);
        }

        if let Some(stream) = &self.stream {
            stream.play().map_err(|e| DeviceError::Io(e.to_string()))?;
        }
        Ok(())
    }

    fn read_interleaved(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceError> {
        let channels = self.channels.max(1) as usize;
        let wanted = buffer.len() / channels * channels;

        let mut filled = 0;
        while filled < wanted {
            if let Some(message) = self.take_stream_error() {
                return Err(DeviceError::Io(message));
            }

            let consumer = self
                .consumer
                .as_mut()
                .ok_or_else(|| DeviceError::Io("stream not built".to_string()))?;
            if consumer.take_overrun() {
                return Err(DeviceError::Overrun);
            }

            let n = consumer.read(&mut buffer[filled..wanted]);
            filled += n;
            if n == 0 {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        Ok(filled / channels)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("stream pause on close failed: {}", e);
            }
        }
        self.consumer = None;
    }
}

/// Pick the supported rate closest to `rate`
///
/// Each `(min, max)` range offers the request clamped into it; the first
/// range with the smallest distance wins.
///
/// # Returns
/// Index of the winning range and the rate it offers, or `None` when
/// there are no ranges.
fn nearest_rate(rate: u32, ranges: impl Iterator<Item = (u32, u32)>) -> Option<(usize, u32)> {
    ranges
        .enumerate()
        .map(|(index, (min, max))| (index, rate.clamp(min, max.max(min))))
        .min_by_key(|&(_, actual)| actual.abs_diff(rate))
}

/// List available audio input devices
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let device_iter = host.input_devices().map_err(|e| CaptureError::DeviceUnavailable {
        device: host.id().name().to_string(),
        stage: SetupStage::Open,
        reason: e.to_string(),
    })?;

    for device in device_iter {
        if let Ok(name) = device.name() {
            if let Ok(config) = device.default_input_config() {
                devices.push(AudioDeviceInfo {
                    name,
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                });
            }
        }
    }

    Ok(devices)
}
