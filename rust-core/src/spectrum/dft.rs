//! Reference discrete Fourier transform
//!
//! Direct summation over all n for each output bin. O(N²), but valid for
//! any N >= 1 and independent of any FFT library, which makes it the
//! yardstick the accelerated engine is tested against.

use num_complex::Complex;
use std::f64::consts::PI;

use super::transform::{num_bins, SpectralTransform, Spectrum, TransformStrategy};

pub struct ReferenceDft {
    size: usize,
    /// e^{-2 pi i m / N} for m in 0..N
    twiddles: Vec<Complex<f64>>,
}

impl ReferenceDft {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "transform size must be at least 1");
        let twiddles = (0..size)
            .map(|m| {
                let angle = -2.0 * PI * m as f64 / size as f64;
                Complex::new(angle.cos(), angle.sin())
            })
            .collect();

        Self { size, twiddles }
    }
}

impl SpectralTransform for ReferenceDft {
    fn size(&self) -> usize {
        self.size
    }

    fn transform(&mut self, signal: &[f64], spectrum: &mut Spectrum) {
        let n_total = self.size;
        assert_eq!(signal.len(), n_total, "signal length must equal transform size");
        assert_eq!(spectrum.fft_size(), n_total, "spectrum built for a different size");

        for (k, out) in spectrum.bins_mut().iter_mut().enumerate().take(num_bins(n_total)) {
            let mut re = 0.0;
            let mut im = 0.0;
            // (k * n) mod N walks the twiddle table without overflow
            let mut index = 0;
            for &x in signal {
                let w = self.twiddles[index];
                re += x * w.re;
                im += x * w.im;
                index += k;
                if index >= n_total {
                    index -= n_total;
                }
            }
            *out = Complex::new(re, im);
        }
    }

    fn strategy(&self) -> TransformStrategy {
        TransformStrategy::Reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_signal() {
        let mut dft = ReferenceDft::new(16);
        let mut spectrum = Spectrum::new(16);
        dft.transform(&[1.0; 16], &mut spectrum);

        assert!((spectrum.magnitude(0) - 16.0).abs() < 1e-12);
        assert!(spectrum.magnitudes().skip(1).all(|m| m < 1e-9));
    }

    #[test]
    fn test_odd_length() {
        // Impulse: flat spectrum of magnitude 1
        let mut signal = vec![0.0; 7];
        signal[0] = 1.0;
        let mut dft = ReferenceDft::new(7);
        let mut spectrum = Spectrum::new(7);
        dft.transform(&signal, &mut spectrum);

        assert_eq!(spectrum.len(), 4);
        assert!(spectrum.magnitudes().all(|m| (m - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_single_sample() {
        let mut dft = ReferenceDft::new(1);
        let mut spectrum = Spectrum::new(1);
        dft.transform(&[-0.25], &mut spectrum);
        assert_eq!(spectrum.len(), 1);
        assert!((spectrum.bins()[0].re + 0.25).abs() < 1e-15);
    }

    #[test]
    #[should_panic]
    fn test_length_mismatch_panics() {
        let mut dft = ReferenceDft::new(8);
        let mut spectrum = Spectrum::new(8);
        dft.transform(&[0.0; 4], &mut spectrum);
    }
}
