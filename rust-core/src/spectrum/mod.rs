//! Spectral analysis: one-sided DFT of real frames

pub mod dft;
pub mod fft;
pub mod transform;

pub use dft::ReferenceDft;
pub use fft::FftEngine;
pub use transform::{bin_frequency, num_bins, SpectralTransform, Spectrum, TransformStrategy};
