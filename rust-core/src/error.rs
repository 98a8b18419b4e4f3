//! Error types for capture and analysis

use std::fmt;
use thiserror::Error;

use crate::audio::session::SessionState;

/// Step of device setup that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Open,
    Access,
    Format,
    Channels,
    Rate,
    Apply,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStage::Open => "open device",
            SetupStage::Access => "set access type",
            SetupStage::Format => "set sample format",
            SetupStage::Channels => "set channel count",
            SetupStage::Rate => "set sample rate",
            SetupStage::Apply => "set parameters",
        };
        f.write_str(name)
    }
}

/// Errors reported by a device backend
///
/// Backends only distinguish overruns from everything else; the capture
/// session decides what each one means for the run.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("overrun occurred")]
    Overrun,

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    Io(String),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Cannot {stage} on {device}: {reason}")]
    DeviceUnavailable {
        device: String,
        stage: SetupStage,
        reason: String,
    },

    #[error("Capture buffer overrun")]
    Overrun,

    #[error("Giving up after {0} consecutive overruns")]
    OverrunLimit(u32),

    #[error("Read from audio interface failed: {0}")]
    Device(String),

    #[error("Cannot allocate {0}")]
    Allocation(String),

    #[error("Invalid configuration: {0}")]
    Precondition(String),

    #[error("Sink error: {0}")]
    Sink(#[from] std::io::Error),

    #[error("Cannot {op} a {state:?} capture session")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },
}

impl CaptureError {
    /// Whether the orchestrator may recover from this error by re-preparing
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CaptureError::Overrun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_names_stage() {
        let err = CaptureError::DeviceUnavailable {
            device: "hw:0".to_string(),
            stage: SetupStage::Format,
            reason: "no i16 capture configuration".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot set sample format on hw:0: no i16 capture configuration"
        );
    }

    #[test]
    fn test_only_overrun_is_recoverable() {
        assert!(CaptureError::Overrun.is_recoverable());
        assert!(!CaptureError::OverrunLimit(3).is_recoverable());
        assert!(!CaptureError::Device("gone".into()).is_recoverable());
    }
}
