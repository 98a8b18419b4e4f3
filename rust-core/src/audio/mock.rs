//! Scripted in-memory device for tests

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::device::{AccessMode, PcmDevice, SampleFormat};
use crate::error::{DeviceError, SetupStage};
use crate::pipeline::StopToken;

/// One scripted response to `read_interleaved`
pub(crate) enum Script {
    /// Deliver this many frames, every sample set to the value
    Frames(usize, i16),
    /// Deliver frames and raise the stop token, as if interrupted mid-read
    FramesThenStop(usize, i16, StopToken),
    Overrun,
    Fail(&'static str),
}

#[derive(Debug, Default)]
pub(crate) struct DeviceLog {
    pub prepares: usize,
    pub reads: usize,
    pub closes: usize,
}

pub(crate) struct ScriptedDevice {
    script: VecDeque<Script>,
    rate: Option<u32>,
    fail_stage: Option<SetupStage>,
    channels: u16,
    log: Rc<RefCell<DeviceLog>>,
}

impl ScriptedDevice {
    /// Reads past the end of the script report end of stream
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script: script.into(),
            rate: None,
            fail_stage: None,
            channels: 0,
            log: Rc::new(RefCell::new(DeviceLog::default())),
        }
    }

    /// Substitute this rate for whatever is requested
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn failing_at(mut self, stage: SetupStage) -> Self {
        self.fail_stage = Some(stage);
        self
    }

    pub fn log(&self) -> Rc<RefCell<DeviceLog>> {
        Rc::clone(&self.log)
    }

    fn check(&self, stage: SetupStage) -> Result<(), DeviceError> {
        if self.fail_stage == Some(stage) {
            return Err(DeviceError::Unsupported(format!("scripted failure at {}", stage)));
        }
        Ok(())
    }

    fn fill(&self, buffer: &mut [i16], frames: usize, value: i16) -> usize {
        let channels = self.channels.max(1) as usize;
        let frames = frames.min(buffer.len() / channels);
        buffer[..frames * channels].fill(value);
        frames
    }
}

impl PcmDevice for ScriptedDevice {
    fn name(&self) -> &str {
        "mock"
    }

    fn set_access(&mut self, access: AccessMode) -> Result<(), DeviceError> {
        self.check(SetupStage::Access)?;
        match access {
            AccessMode::Interleaved => Ok(()),
            AccessMode::Planar => Err(DeviceError::Unsupported("planar".to_string())),
        }
    }

    fn set_format(&mut self, _format: SampleFormat) -> Result<(), DeviceError> {
        self.check(SetupStage::Format)
    }

    fn set_channels(&mut self, channels: u16) -> Result<(), DeviceError> {
        self.check(SetupStage::Channels)?;
        self.channels = channels;
        Ok(())
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32, DeviceError> {
        self.check(SetupStage::Rate)?;
        Ok(self.rate.unwrap_or(rate))
    }

    fn apply(&mut self) -> Result<(), DeviceError> {
        self.check(SetupStage::Apply)
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.log.borrow_mut().prepares += 1;
        Ok(())
    }

    fn read_interleaved(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceError> {
        self.log.borrow_mut().reads += 1;
        match self.script.pop_front() {
            Some(Script::Frames(frames, value)) => Ok(self.fill(buffer, frames, value)),
            Some(Script::FramesThenStop(frames, value, stop)) => {
                let frames = self.fill(buffer, frames, value);
                stop.stop();
                Ok(frames)
            }
            Some(Script::Overrun) => Err(DeviceError::Overrun),
            Some(Script::Fail(message)) => Err(DeviceError::Io(message.to_string())),
            None => Ok(0),
        }
    }

    fn close(&mut self) {
        self.log.borrow_mut().closes += 1;
    }
}
