//! FFT engine using realfft for real-valued signals
//!
//! Optimized for real-time spectral analysis

use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use super::transform::{SpectralTransform, Spectrum, TransformStrategy};

/// FFT engine for real-valued signals
pub struct FftEngine {
    /// FFT size (number of samples)
    fft_size: usize,

    /// Real FFT processor
    r2c: Arc<dyn RealToComplex<f64>>,

    /// Reusable input buffer (realfft overwrites its input)
    input_buffer: Vec<f64>,

    /// Reusable output buffer (complex spectrum)
    output_buffer: Vec<Complex<f64>>,

    scratch: Vec<Complex<f64>>,
}

impl FftEngine {
    /// Create new FFT engine
    ///
    /// # Arguments
    /// * `fft_size` - FFT size (number of samples); any N >= 1, fastest for powers of two
    pub fn new(fft_size: usize) -> Self {
        assert!(fft_size > 0, "transform size must be at least 1");
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);

        let input_buffer = r2c.make_input_vec();
        let output_buffer = r2c.make_output_vec();
        let scratch = r2c.make_scratch_vec();

        Self {
            fft_size,
            r2c,
            input_buffer,
            output_buffer,
            scratch,
        }
    }

    /// Get FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Get number of frequency bins (fft_size/2 + 1 for real FFT)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

impl SpectralTransform for FftEngine {
    fn size(&self) -> usize {
        self.fft_size
    }

    fn transform(&mut self, signal: &[f64], spectrum: &mut Spectrum) {
        assert_eq!(signal.len(), self.fft_size, "signal length must equal transform size");
        assert_eq!(spectrum.fft_size(), self.fft_size, "spectrum built for a different size");

        self.input_buffer.copy_from_slice(signal);

        // Lengths are fixed at construction, so this cannot fail
        self.r2c
            .process_with_scratch(&mut self.input_buffer, &mut self.output_buffer, &mut self.scratch)
            .expect("FFT processing failed");

        spectrum.bins_mut().copy_from_slice(&self.output_buffer);
    }

    fn strategy(&self) -> TransformStrategy {
        TransformStrategy::Accelerated
    }
}
