//! Capture session: parameter negotiation and frame reads
//!
//! ```text
//! open -> Configured -> prepare -> Prepared -> read_frame -> Streaming
//!                                     ^                          |
//!                                     +------ prepare <- Overrun +
//! any state -> close -> Closed (terminal)
//! ```

use log::{debug, info, warn};

use super::device::{DeviceConfig, PcmDevice};
use super::frame::RawFrame;
use crate::error::{CaptureError, DeviceError, SetupStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configured,
    Prepared,
    Streaming,
    /// Last read lost data; must be prepared again before reading
    Overrun,
    Closed,
}

/// An open, negotiated capture device
pub struct CaptureSession<D: PcmDevice> {
    device: D,
    config: DeviceConfig,
    state: SessionState,
}

impl<D: PcmDevice> CaptureSession<D> {
    /// Negotiate access, format, channels and rate, in that order
    ///
    /// The returned session's `config()` carries the negotiated rate, which
    /// may differ from `desired.requested_rate`.
    pub fn open(mut device: D, desired: &DeviceConfig) -> Result<Self, CaptureError> {
        let name = device.name().to_string();
        let fail = |stage: SetupStage| {
            let name = name.clone();
            move |e: DeviceError| CaptureError::DeviceUnavailable {
                device: name,
                stage,
                reason: e.to_string(),
            }
        };

        device.set_access(desired.access).map_err(fail(SetupStage::Access))?;
        debug!("{}: access {:?}", name, desired.access);

        device.set_format(desired.format).map_err(fail(SetupStage::Format))?;
        debug!("{}: format {:?}", name, desired.format);

        device.set_channels(desired.channels).map_err(fail(SetupStage::Channels))?;
        debug!("{}: {} channels", name, desired.channels);

        let actual_rate = device
            .set_rate_near(desired.requested_rate)
            .map_err(fail(SetupStage::Rate))?;

        device.apply().map_err(fail(SetupStage::Apply))?;

        let mut config = desired.clone();
        config.device = name.clone();
        config.sample_rate = actual_rate;
        if config.rate_substituted() {
            warn!(
                "{}: requested {} Hz, device negotiated {} Hz",
                name, config.requested_rate, config.sample_rate
            );
        }
        info!(
            "{}: configured {} Hz, {} channels, {:?} ({} bytes per frame)",
            name,
            config.sample_rate,
            config.channels,
            config.format,
            config.bytes_per_frame()
        );

        Ok(Self {
            device,
            config,
            state: SessionState::Configured,
        })
    }

    /// Negotiated device parameters
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Ready the stream for reads; also the recovery path after an overrun
    pub fn prepare(&mut self) -> Result<(), CaptureError> {
        if self.state == SessionState::Closed {
            return Err(CaptureError::InvalidState {
                op: "prepare",
                state: self.state,
            });
        }
        self.device
            .prepare()
            .map_err(|e| CaptureError::Device(format!("cannot prepare audio interface: {}", e)))?;
        self.state = SessionState::Prepared;
        Ok(())
    }

    /// Block until one frame's worth of samples is available
    ///
    /// # Returns
    /// Sample frames delivered. Fewer than `frame.frame_size()` is a short
    /// read (the rest of the frame is stale and must be padded); zero means
    /// the source is exhausted.
    pub fn read_frame(&mut self, frame: &mut RawFrame) -> Result<usize, CaptureError> {
        match self.state {
            SessionState::Prepared | SessionState::Streaming => {}
            state => {
                return Err(CaptureError::InvalidState {
                    op: "read from",
                    state,
                })
            }
        }
        assert_eq!(
            frame.channels(),
            self.config.channels as usize,
            "frame geometry does not match negotiated channel count"
        );

        match self.device.read_interleaved(frame.samples_mut()) {
            Ok(frames) => {
                frame.set_valid_frames(frames);
                self.state = SessionState::Streaming;
                if frames > 0 && frames < frame.frame_size() {
                    debug!(
                        "{}: short read ({} of {} frames)",
                        self.config.device,
                        frames,
                        frame.frame_size()
                    );
                }
                Ok(frames)
            }
            Err(DeviceError::Overrun) => {
                frame.set_valid_frames(0);
                self.state = SessionState::Overrun;
                Err(CaptureError::Overrun)
            }
            Err(e) => {
                frame.set_valid_frames(0);
                Err(CaptureError::Device(e.to_string()))
            }
        }
    }

    /// Release the device; repeated calls are no-ops
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.device.close();
        self.state = SessionState::Closed;
        info!("{}: audio interface closed", self.config.device);
    }
}

impl<D: PcmDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}
