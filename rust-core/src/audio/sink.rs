//! Byte sinks for captured audio
//!
//! Sinks get one write attempt per frame. A short write is the caller's to
//! report; nothing here retries.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::CaptureError;

/// Append-only destination for raw frame bytes
pub trait ByteSink {
    /// Write once; returns how many bytes were accepted
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Flush and release; called exactly once at the end of a run
    fn finish(&mut self) -> io::Result<()>;
}

/// Buffered file sink
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileSink {
    /// Create (or truncate) the output file
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl ByteSink for FileSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sink already finished"))?;
        let n = writer.write(bytes)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

/// Discards everything (analysis-only runs)
#[derive(Debug, Default)]
pub struct NullSink;

impl ByteSink for NullSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        Ok(bytes.len())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<usize> {
        (**self).write_bytes(bytes)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}
