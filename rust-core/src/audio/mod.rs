//! Audio capture: devices, sessions, frames and sinks

pub mod buffer;
pub mod device;
pub mod file;
pub mod frame;
pub mod input;
pub mod session;
pub mod sink;

#[cfg(test)]
pub(crate) mod mock;

pub use device::{AccessMode, DeviceConfig, PcmDevice, SampleFormat};
pub use file::{RawFileSource, WavSource};
pub use frame::{convert, convert_frame, mean_level, RawFrame};
pub use input::{list_input_devices, AudioDeviceInfo, CpalDevice};
pub use session::{CaptureSession, SessionState};
pub use sink::{ByteSink, FileSink, NullSink};
