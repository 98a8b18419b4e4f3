//! Transform strategy abstraction and the spectrum it produces

use num_complex::Complex;
use std::fmt;
use std::str::FromStr;

use super::dft::ReferenceDft;
use super::fft::FftEngine;

/// One-sided spectrum of a real frame: `fft_size / 2 + 1` complex bins
#[derive(Debug, Clone)]
pub struct Spectrum {
    fft_size: usize,
    bins: Vec<Complex<f64>>,
}

impl Spectrum {
    /// Zeroed spectrum for frames of `fft_size` samples
    pub fn new(fft_size: usize) -> Self {
        Self {
            fft_size,
            bins: vec![Complex::new(0.0, 0.0); num_bins(fft_size)],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[Complex<f64>] {
        &self.bins
    }

    pub fn bins_mut(&mut self) -> &mut [Complex<f64>] {
        &mut self.bins
    }

    /// |X[k]|
    pub fn magnitude(&self, bin: usize) -> f64 {
        self.bins[bin].norm()
    }

    pub fn magnitudes(&self) -> impl Iterator<Item = f64> + '_ {
        self.bins.iter().map(|c| c.norm())
    }

    /// 20*log10(|X[k]| / reference), floored to avoid log(0)
    pub fn magnitude_db(&self, bin: usize, reference: f64) -> f64 {
        let mag_clamped = self.magnitude(bin).max(1e-10);
        20.0 * (mag_clamped / reference).log10()
    }

    /// Centre frequency of `bin` in Hz
    ///
    /// `sample_rate` must be the negotiated device rate.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f64 {
        bin_frequency(bin, sample_rate, self.fft_size)
    }

    /// Strongest bin, as (index, magnitude)
    pub fn peak(&self) -> Option<(usize, f64)> {
        self.magnitudes()
            .enumerate()
            .fold(None, |best, (k, mag)| match best {
                Some((_, best_mag)) if best_mag >= mag => best,
                _ => Some((k, mag)),
            })
    }
}

/// Number of one-sided bins for a real transform of `fft_size` samples
pub fn num_bins(fft_size: usize) -> usize {
    fft_size / 2 + 1
}

/// Frequency of bin k: k * sample_rate / N
pub fn bin_frequency(bin: usize, sample_rate: u32, fft_size: usize) -> f64 {
    bin as f64 * sample_rate as f64 / fft_size as f64
}

/// Forward transform of a real frame into a one-sided spectrum
///
/// Implementations must agree with each other within floating-point
/// tolerance; callers never need to know which one they hold.
pub trait SpectralTransform {
    /// Frame length N this transform was built for
    fn size(&self) -> usize;

    /// Compute X[k] = sum_n x[n] e^{-2 pi i k n / N} for k in 0..=N/2
    ///
    /// # Panics
    /// If `signal.len() != self.size()` or `spectrum.fft_size() != self.size()`.
    fn transform(&mut self, signal: &[f64], spectrum: &mut Spectrum);

    fn strategy(&self) -> TransformStrategy;
}

/// Runtime-selectable transform implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformStrategy {
    /// Direct O(N²) summation, no dependencies on N
    Reference,
    /// Real-input FFT via realfft
    #[default]
    Accelerated,
}

impl TransformStrategy {
    /// Build a transform for frames of `size` samples
    pub fn build(self, size: usize) -> Box<dyn SpectralTransform> {
        match self {
            TransformStrategy::Reference => Box::new(ReferenceDft::new(size)),
            TransformStrategy::Accelerated => Box::new(FftEngine::new(size)),
        }
    }
}

impl fmt::Display for TransformStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformStrategy::Reference => f.write_str("reference"),
            TransformStrategy::Accelerated => f.write_str("accelerated"),
        }
    }
}

impl FromStr for TransformStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reference" | "dft" => Ok(TransformStrategy::Reference),
            "accelerated" | "fft" => Ok(TransformStrategy::Accelerated),
            other => Err(format!("unknown transform strategy '{}' (expected reference or accelerated)", other)),
        }
    }
}
