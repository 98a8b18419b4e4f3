//! PCM Spectrum - Audio Capture and Spectral Analysis Core
//!
//! Captures interleaved 16 bit PCM from a live input device or a recorded
//! file, writes the raw bytes to a sink, and computes a one-sided DFT of
//! one channel per frame.

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod spectrum;

pub use config::CaptureConfig;
pub use error::{CaptureError, DeviceError};
pub use pipeline::{CaptureLoop, RunFailure, RunSummary, StopReason, StopToken};
pub use spectrum::{Spectrum, TransformStrategy};
