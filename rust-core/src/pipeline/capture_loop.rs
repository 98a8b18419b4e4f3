//! Capture loop: read -> convert -> transform -> sink + report
//!
//! Keeps the hot loop free of allocations: every buffer is allocated once
//! when the loop is built and reused for the whole run.

use log::{debug, error, info, warn};
use std::fmt;
use thiserror::Error;

use super::report::{FrameReport, Reporter};
use super::stop::StopToken;
use crate::audio::{convert_frame, ByteSink, CaptureSession, PcmDevice, RawFrame};
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::spectrum::{SpectralTransform, Spectrum, TransformStrategy};

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stop token raised
    Cancelled,
    /// Configured frame count reached
    FrameLimit,
    /// Source returned no more data
    EndOfStream,
    /// Unrecoverable device error or too many overruns
    Failed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("interrupted"),
            StopReason::FrameLimit => f.write_str("frame limit reached"),
            StopReason::EndOfStream => f.write_str("end of input"),
            StopReason::Failed => f.write_str("aborted on error"),
        }
    }
}

/// Mutable run accounting, owned by the capture loop
#[derive(Debug, Clone, Default)]
pub struct CaptureState {
    pub running: bool,
    /// Sample frames captured (valid frames only, padding excluded)
    pub frames_recorded: u64,
    /// Frames pushed through the transform
    pub windows: u64,
    pub overruns: u64,
    pub short_reads: u64,
    pub sink_shortfalls: u64,
    pub last_error: Option<String>,
}

/// Accounting of a finished run, whatever ended it
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames_recorded: u64,
    pub windows: u64,
    pub overruns: u64,
    pub short_reads: u64,
    pub sink_shortfalls: u64,
    /// Negotiated rate
    pub sample_rate: u32,
    pub stop_reason: StopReason,
}

impl RunSummary {
    /// Captured audio duration: frames_recorded / sample_rate
    pub fn duration_secs(&self) -> f64 {
        self.frames_recorded as f64 / self.sample_rate as f64
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Recording Summary ===")?;
        writeln!(f, "Stopped: {}", self.stop_reason)?;
        writeln!(f, "Total frames recorded: {}", self.frames_recorded)?;
        writeln!(f, "Frames analyzed: {}", self.windows)?;
        writeln!(f, "Total duration: {:.2} seconds", self.duration_secs())?;
        write!(
            f,
            "Overruns: {}, short reads: {}, sink shortfalls: {}",
            self.overruns, self.short_reads, self.sink_shortfalls
        )
    }
}

/// A run that ended on a fatal error
///
/// The sink was finished and the device closed before this was returned;
/// `summary` covers everything captured up to the failure.
#[derive(Error, Debug)]
#[error("capture aborted after {} frames", .summary.frames_recorded)]
pub struct RunFailure {
    #[source]
    pub error: CaptureError,
    pub summary: RunSummary,
}

/// Orchestrates one capture run
pub struct CaptureLoop {
    frame: RawFrame,
    signal: Vec<f64>,
    spectrum: Spectrum,
    transform: Box<dyn SpectralTransform>,
    channel: usize,
    sample_rate: u32,
    max_consecutive_overruns: u32,
    max_frames: Option<u64>,
    progress_interval: u64,
    state: CaptureState,
}

impl CaptureLoop {
    /// Allocate run buffers for a negotiated session
    ///
    /// Uses the session's negotiated rate and channel count, never the
    /// requested ones.
    pub fn new<D: PcmDevice>(
        config: &CaptureConfig,
        session: &CaptureSession<D>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        let negotiated = session.config();
        let channels = negotiated.channels as usize;
        if config.channel >= channels {
            return Err(CaptureError::Precondition(format!(
                "channel {} out of range for {} negotiated channels",
                config.channel, channels
            )));
        }

        let frame = RawFrame::try_new(config.frame_size, channels)?;

        let mut signal = Vec::new();
        signal
            .try_reserve_exact(config.frame_size)
            .map_err(|e| CaptureError::Allocation(format!("signal buffer ({})", e)))?;
        signal.resize(config.frame_size, 0.0);

        Ok(Self {
            frame,
            signal,
            spectrum: Spectrum::new(config.frame_size),
            transform: config.strategy.build(config.frame_size),
            channel: config.channel,
            sample_rate: negotiated.sample_rate,
            max_consecutive_overruns: config.max_consecutive_overruns,
            max_frames: config.max_frames,
            progress_interval: config.progress_interval,
            state: CaptureState::default(),
        })
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn strategy(&self) -> TransformStrategy {
        self.transform.strategy()
    }

    /// Run until stopped, exhausted, or failed
    ///
    /// Whatever ends the run, the sink is finished and the session closed
    /// exactly once before this returns, and a summary is produced. On a
    /// fatal error the summary travels inside the `RunFailure`.
    pub fn run<D, S, R>(
        &mut self,
        mut session: CaptureSession<D>,
        sink: &mut S,
        reporter: &mut R,
        stop: &StopToken,
    ) -> Result<RunSummary, RunFailure>
    where
        D: PcmDevice,
        S: ByteSink,
        R: Reporter,
    {
        info!(
            "capturing {} frames of {} samples per read at {} Hz ({} transform)",
            self.max_frames.map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
            self.frame.frame_size(),
            self.sample_rate,
            self.transform.strategy()
        );

        self.state.running = true;
        let outcome = self.drive(&mut session, sink, reporter, stop);
        self.state.running = false;

        if let Err(e) = sink.finish() {
            warn!("output sink did not flush cleanly: {}", e);
            self.state.sink_shortfalls += 1;
        }
        session.close();

        match outcome {
            Ok(stop_reason) => Ok(self.summary(stop_reason)),
            Err(error) => {
                error!(
                    "capture aborted after {} frames: {}",
                    self.state.frames_recorded, error
                );
                self.state.last_error = Some(error.to_string());
                Err(RunFailure {
                    error,
                    summary: self.summary(StopReason::Failed),
                })
            }
        }
    }

    fn drive<D, S, R>(
        &mut self,
        session: &mut CaptureSession<D>,
        sink: &mut S,
        reporter: &mut R,
        stop: &StopToken,
    ) -> Result<StopReason, CaptureError>
    where
        D: PcmDevice,
        S: ByteSink,
        R: Reporter,
    {
        session.prepare()?;
        info!("audio interface prepared");

        loop {
            if stop.is_stopped() {
                return Ok(StopReason::Cancelled);
            }
            if self.max_frames.is_some_and(|max| self.state.windows >= max) {
                return Ok(StopReason::FrameLimit);
            }

            let valid = self.read_with_recovery(session)?;
            if valid == 0 {
                return Ok(StopReason::EndOfStream);
            }
            if valid < self.frame.frame_size() {
                self.state.short_reads += 1;
            }

            self.write_to_sink(sink);

            convert_frame(&self.frame, self.channel, &mut self.signal);
            self.transform.transform(&self.signal, &mut self.spectrum);

            reporter.report(&FrameReport {
                index: self.state.windows,
                valid_frames: valid,
                level: self.frame.level(),
                spectrum: &self.spectrum,
                sample_rate: self.sample_rate,
            });

            self.state.frames_recorded += valid as u64;
            self.state.windows += 1;
            self.log_progress();
        }
    }

    /// Read one frame, re-preparing after each overrun up to the limit
    fn read_with_recovery<D: PcmDevice>(
        &mut self,
        session: &mut CaptureSession<D>,
    ) -> Result<usize, CaptureError> {
        let mut consecutive = 0u32;
        loop {
            match session.read_frame(&mut self.frame) {
                Ok(valid) => return Ok(valid),
                Err(e) if e.is_recoverable() => {
                    consecutive += 1;
                    self.state.overruns += 1;
                    if consecutive > self.max_consecutive_overruns {
                        return Err(CaptureError::OverrunLimit(consecutive));
                    }
                    warn!(
                        "overrun occurred, re-preparing ({}/{})",
                        consecutive, self.max_consecutive_overruns
                    );
                    session.prepare()?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_to_sink<S: ByteSink>(&mut self, sink: &mut S) {
        let bytes = self.frame.le_bytes();
        let expected = bytes.len();
        match sink.write_bytes(bytes) {
            Ok(written) if written == expected => {}
            Ok(written) => {
                self.state.sink_shortfalls += 1;
                warn!("wrote {} bytes instead of {}", written, expected);
            }
            Err(e) => {
                self.state.sink_shortfalls += 1;
                warn!("write of {} bytes failed: {}", expected, e);
            }
        }
    }

    fn log_progress(&self) {
        if self.progress_interval == 0 {
            return;
        }
        if self.state.windows % self.progress_interval == 0 {
            info!(
                "Recording... frames: {} ({:.2} seconds)",
                self.state.frames_recorded,
                self.state.frames_recorded as f64 / self.sample_rate as f64
            );
        } else {
            debug!("frame {} processed", self.state.windows);
        }
    }

    fn summary(&self, stop_reason: StopReason) -> RunSummary {
        RunSummary {
            frames_recorded: self.state.frames_recorded,
            windows: self.state.windows,
            overruns: self.state.overruns,
            short_reads: self.state.short_reads,
            sink_shortfalls: self.state.sink_shortfalls,
            sample_rate: self.sample_rate,
            stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::{Script, ScriptedDevice};
    use crate::audio::{NullSink, RawFileSource};
    use std::io::{self, Cursor};

    /// Keeps the index and valid count of every report
    #[derive(Default)]
    struct Recorder {
        frames: Vec<(u64, usize)>,
    }

    impl Reporter for Recorder {
        fn report(&mut self, frame: &FrameReport<'_>) {
            self.frames.push((frame.index, frame.valid_frames));
        }
    }

    /// Accepts only half of each write
    #[derive(Default)]
    struct HalfSink {
        finishes: usize,
        bytes: usize,
    }

    impl ByteSink for HalfSink {
        fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.bytes += bytes.len() / 2;
            Ok(bytes.len() / 2)
        }

        fn finish(&mut self) -> io::Result<()> {
            self.finishes += 1;
            Ok(())
        }
    }

    fn config(frame_size: usize) -> CaptureConfig {
        CaptureConfig {
            device: "mock".to_string(),
            sample_rate: 44100,
            channels: 2,
            frame_size,
            progress_interval: 0,
            ..Default::default()
        }
    }

    fn open(device: ScriptedDevice, config: &CaptureConfig) -> CaptureSession<ScriptedDevice> {
        CaptureSession::open(device, &config.device_config()).unwrap()
    }

    #[test]
    fn test_summary_accounting() {
        let config = config(64);
        let device = ScriptedDevice::new(vec![
            Script::Frames(64, 100),
            Script::Frames(64, 200),
            Script::Frames(64, 300),
        ])
        .with_rate(48000);
        let session = open(device, &config);

        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let summary = capture
            .run(session, &mut NullSink, &mut Recorder::default(), &StopToken::new())
            .unwrap();

        assert_eq!(summary.windows, 3);
        assert_eq!(summary.frames_recorded, 3 * 64);
        assert_eq!(summary.sample_rate, 48000);
        assert!((summary.duration_secs() - 192.0 / 48000.0).abs() < 1e-12);
        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert!(!capture.state().running);
    }

    #[test]
    fn test_overrun_recovery_completes_frame() {
        let config = config(32);
        let device = ScriptedDevice::new(vec![
            Script::Frames(32, 1),
            Script::Overrun,
            Script::Frames(32, 2),
        ]);
        let log = device.log();
        let session = open(device, &config);

        let mut recorder = Recorder::default();
        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let summary = capture
            .run(session, &mut NullSink, &mut recorder, &StopToken::new())
            .unwrap();

        assert_eq!(summary.windows, 2);
        assert_eq!(summary.overruns, 1);
        assert_eq!(recorder.frames, vec![(0, 32), (1, 32)]);

        let log = log.borrow();
        assert_eq!(log.prepares, 2);
        assert_eq!(log.closes, 1);
    }

    #[test]
    fn test_persistent_overrun_is_fatal_and_closes_once() {
        let mut config = config(16);
        config.max_consecutive_overruns = 2;
        let device = ScriptedDevice::new(vec![
            Script::Overrun,
            Script::Overrun,
            Script::Overrun,
            Script::Frames(16, 1),
        ]);
        let log = device.log();
        let session = open(device, &config);

        let mut sink = HalfSink::default();
        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let failure = capture
            .run(session, &mut sink, &mut Recorder::default(), &StopToken::new())
            .unwrap_err();

        assert!(matches!(failure.error, CaptureError::OverrunLimit(3)));
        assert_eq!(failure.summary.stop_reason, StopReason::Failed);
        assert_eq!(failure.summary.overruns, 3);
        assert_eq!(failure.summary.windows, 0);
        assert_eq!(sink.finishes, 1);
        assert_eq!(log.borrow().closes, 1);
        assert!(capture.state().last_error.is_some());
    }

    #[test]
    fn test_device_error_releases_resources() {
        let config = config(16);
        let device = ScriptedDevice::new(vec![Script::Frames(16, 1), Script::Fail("unplugged")]);
        let log = device.log();
        let session = open(device, &config);

        let mut sink = HalfSink::default();
        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let failure = capture
            .run(session, &mut sink, &mut Recorder::default(), &StopToken::new())
            .unwrap_err();

        assert!(matches!(failure.error, CaptureError::Device(_)));
        assert_eq!(capture.state().frames_recorded, 16);
        assert_eq!(sink.finishes, 1);
        assert_eq!(log.borrow().closes, 1);
    }

    #[test]
    fn test_device_error_still_reports_summary() {
        let config = config(16);
        let device = ScriptedDevice::new(vec![
            Script::Frames(16, 1),
            Script::Frames(16, 2),
            Script::Fail("unplugged"),
        ])
        .with_rate(8000);
        let session = open(device, &config);

        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let failure = capture
            .run(session, &mut NullSink, &mut Recorder::default(), &StopToken::new())
            .unwrap_err();

        let summary = &failure.summary;
        assert_eq!(summary.stop_reason, StopReason::Failed);
        assert_eq!(summary.frames_recorded, 32);
        assert_eq!(summary.windows, 2);
        assert_eq!(summary.sample_rate, 8000);
        assert!((summary.duration_secs() - 32.0 / 8000.0).abs() < 1e-12);

        assert!(summary.to_string().contains("Stopped: aborted on error"));
        assert_eq!(failure.to_string(), "capture aborted after 32 frames");
        let cause = std::error::Error::source(&failure).unwrap().to_string();
        assert!(cause.contains("unplugged"));
    }

    #[test]
    fn test_short_read_mid_stream_is_padded_and_run_continues() {
        let config = CaptureConfig {
            strategy: TransformStrategy::Reference,
            ..config(16)
        };
        // The short read leaves stale samples from the previous frame behind
        let device = ScriptedDevice::new(vec![
            Script::Frames(16, 1000),
            Script::Frames(5, 8192),
            Script::Frames(16, 1000),
        ]);
        let session = open(device, &config);

        struct Seen(Vec<(usize, f64, f64)>);
        impl Reporter for Seen {
            fn report(&mut self, frame: &FrameReport<'_>) {
                self.0.push((frame.valid_frames, frame.spectrum.magnitude(0), frame.level));
            }
        }

        let mut seen = Seen(Vec::new());
        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let summary = capture
            .run(session, &mut NullSink, &mut seen, &StopToken::new())
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.windows, 3);
        assert_eq!(summary.frames_recorded, 37);
        assert_eq!(summary.short_reads, 1);

        // DC bin is the sum of the 5 valid samples only: 5 * 0.25
        let (valid, dc, level) = seen.0[1];
        assert_eq!(valid, 5);
        assert!((dc - 1.25).abs() < 1e-9);
        assert!((level - 25.0).abs() < 1e-9);

        assert_eq!(seen.0[2].0, 16);
    }

    #[test]
    fn test_stop_observed_after_current_frame() {
        let config = config(16);
        let stop = StopToken::new();
        let device = ScriptedDevice::new(vec![
            Script::Frames(16, 1),
            Script::FramesThenStop(16, 2, stop.clone()),
            Script::Frames(16, 3),
        ]);
        let log = device.log();
        let session = open(device, &config);

        let mut recorder = Recorder::default();
        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let summary = capture.run(session, &mut NullSink, &mut recorder, &stop).unwrap();

        // The interrupted read still completes and is processed
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.windows, 2);
        assert_eq!(log.borrow().reads, 2);
        assert_eq!(log.borrow().closes, 1);
    }

    #[test]
    fn test_frame_limit() {
        let mut config = config(8);
        config.max_frames = Some(2);
        let device = ScriptedDevice::new((0..5).map(|i| Script::Frames(8, i)).collect());
        let session = open(device, &config);

        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let summary = capture
            .run(session, &mut NullSink, &mut Recorder::default(), &StopToken::new())
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::FrameLimit);
        assert_eq!(summary.windows, 2);
        assert_eq!(summary.frames_recorded, 16);
    }

    #[test]
    fn test_sink_shortfall_is_not_fatal() {
        let config = config(8);
        let device = ScriptedDevice::new(vec![Script::Frames(8, 1), Script::Frames(8, 2)]);
        let session = open(device, &config);

        let mut sink = HalfSink::default();
        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let summary = capture
            .run(session, &mut sink, &mut Recorder::default(), &StopToken::new())
            .unwrap();

        assert_eq!(summary.windows, 2);
        assert_eq!(summary.sink_shortfalls, 2);
        // 8 stereo frames of 16 bit = 32 bytes, half accepted each time
        assert_eq!(sink.bytes, 32);
    }

    #[test]
    fn test_finite_file_two_and_a_half_frames() {
        let frame_size = 1024;
        let config = CaptureConfig {
            device: "mem.raw".to_string(),
            channels: 2,
            frame_size,
            strategy: TransformStrategy::Reference,
            progress_interval: 0,
            ..Default::default()
        };

        // 2.5 frames of a constant tone on the left channel
        let total_frames = frame_size * 5 / 2;
        let bytes: Vec<u8> = (0..total_frames)
            .flat_map(|_| [8192i16, -8192i16])
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let source = RawFileSource::new("mem.raw", Cursor::new(bytes));
        let session = CaptureSession::open(source, &config.device_config()).unwrap();

        struct Dc(Vec<(usize, f64)>);
        impl Reporter for Dc {
            fn report(&mut self, frame: &FrameReport<'_>) {
                self.0.push((frame.valid_frames, frame.spectrum.magnitude(0)));
            }
        }

        let mut reporter = Dc(Vec::new());
        let mut capture = CaptureLoop::new(&config, &session).unwrap();
        let summary = capture
            .run(session, &mut NullSink, &mut reporter, &StopToken::new())
            .unwrap();

        assert_eq!(summary.windows, 3);
        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.frames_recorded, total_frames as u64);
        assert_eq!(summary.short_reads, 1);

        // DC bin = sum of samples; the padded frame only sums its 512 valid ones
        let full = 1024.0 * 0.25;
        assert_eq!(reporter.0.len(), 3);
        assert!((reporter.0[0].1 - full).abs() < 1e-9);
        assert!((reporter.0[1].1 - full).abs() < 1e-9);
        assert_eq!(reporter.0[2].0, 512);
        assert!((reporter.0[2].1 - full / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_channel_beyond_negotiated() {
        let mut config = config(8);
        config.channel = 1;
        config.channels = 2;
        let device = ScriptedDevice::new(vec![]);
        let mut desired = config.device_config();
        desired.channels = 1;
        let session = CaptureSession::open(device, &desired).unwrap();

        assert!(matches!(
            CaptureLoop::new(&config, &session),
            Err(CaptureError::Precondition(_))
        ));
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            frames_recorded: 44100,
            windows: 344,
            overruns: 0,
            short_reads: 0,
            sink_shortfalls: 0,
            sample_rate: 44100,
            stop_reason: StopReason::Cancelled,
        };
        let text = summary.to_string();
        assert!(text.contains("Total frames recorded: 44100"));
        assert!(text.contains("Total duration: 1.00 seconds"));
    }
}
