//! Reporters: what the user sees per processed frame

use log::{info, warn};
use std::io::Write;

use crate::spectrum::Spectrum;

/// Everything known about one processed frame
pub struct FrameReport<'a> {
    /// Zero-based index of the processed frame
    pub index: u64,
    /// Sample frames that came from the source (the rest was padding)
    pub valid_frames: usize,
    /// Mean absolute level of the valid samples, percent of full scale
    pub level: f64,
    pub spectrum: &'a Spectrum,
    /// Negotiated rate, for frequency labels
    pub sample_rate: u32,
}

/// Consumer of per-frame spectra; purely observational
pub trait Reporter {
    fn report(&mut self, frame: &FrameReport<'_>);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report(&mut self, frame: &FrameReport<'_>) {
        (**self).report(frame)
    }
}

/// Prints the first K bins with frequency labels
///
/// ```text
/// === Frame 0 (1024 frames) ===
/// bin   0 (0.0 Hz):       3.21
/// bin   1 (43.1 Hz):      0.87
/// ```
pub struct BinTableReporter<W: Write> {
    out: W,
    bins: usize,
}

impl<W: Write> BinTableReporter<W> {
    pub fn new(out: W, bins: usize) -> Self {
        Self { out, bins }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_table(&mut self, frame: &FrameReport<'_>) -> std::io::Result<()> {
        writeln!(self.out, "\n=== Frame {} ({} frames) ===", frame.index, frame.valid_frames)?;
        let shown = self.bins.min(frame.spectrum.len());
        for k in 0..shown {
            writeln!(
                self.out,
                "bin {:3} ({:.1} Hz): {:10.2}",
                k,
                frame.spectrum.bin_frequency(k, frame.sample_rate),
                frame.spectrum.magnitude(k)
            )?;
        }
        self.out.flush()
    }
}

impl<W: Write> Reporter for BinTableReporter<W> {
    fn report(&mut self, frame: &FrameReport<'_>) {
        if self.bins == 0 {
            return;
        }
        if let Err(e) = self.write_table(frame) {
            warn!("cannot write spectrum report: {}", e);
        }
    }
}

/// Logs the dominant frequency every `every` frames
pub struct PeakReporter {
    every: u64,
}

impl PeakReporter {
    pub fn new(every: u64) -> Self {
        Self { every: every.max(1) }
    }
}

impl Reporter for PeakReporter {
    fn report(&mut self, frame: &FrameReport<'_>) {
        if frame.index % self.every != 0 {
            return;
        }
        // Skip DC so an offset does not mask the tone
        let spectrum = frame.spectrum;
        let peak = (1..spectrum.len()).max_by(|&a, &b| spectrum.magnitude(a).total_cmp(&spectrum.magnitude(b)));
        if let Some(k) = peak {
            info!(
                "frame {}: peak {:.1} Hz ({:.1} dB)",
                frame.index,
                spectrum.bin_frequency(k, frame.sample_rate),
                spectrum.magnitude_db(k, 1.0)
            );
        }
    }
}

/// Tracks the input level and logs it every `every` frames
pub struct LevelReporter {
    every: u64,
    last: Option<f64>,
    max: f64,
}

impl LevelReporter {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            last: None,
            max: 0.0,
        }
    }

    /// Level of the most recent frame
    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// Loudest frame seen so far
    pub fn max(&self) -> f64 {
        self.max
    }
}

impl Reporter for LevelReporter {
    fn report(&mut self, frame: &FrameReport<'_>) {
        self.last = Some(frame.level);
        self.max = self.max.max(frame.level);
        if frame.index % self.every == 0 {
            info!("frame {}: level {:.1}%", frame.index, frame.level);
        }
    }
}

/// Fans one report out to several reporters
#[derive(Default)]
pub struct ReporterSet<'a> {
    reporters: Vec<Box<dyn Reporter + 'a>>,
}

impl<'a> ReporterSet<'a> {
    pub fn new() -> Self {
        Self { reporters: Vec::new() }
    }

    pub fn push(&mut self, reporter: impl Reporter + 'a) {
        self.reporters.push(Box::new(reporter));
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for ReporterSet<'_> {
    fn report(&mut self, frame: &FrameReport<'_>) {
        for reporter in self.reporters.iter_mut() {
            reporter.report(frame);
        }
    }
}
