//! Lock-free ring buffer between the capture callback and the reader
//!
//! The producer side lives in the audio callback; when the reader falls
//! behind and the ring fills up, incoming samples are dropped and the
//! overrun flag is raised for the reader to observe.

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sample ring with shared overrun flag
pub struct SampleRing {
    producer: HeapProducer<i16>,
    consumer: HeapConsumer<i16>,
    overrun: Arc<AtomicBool>,
    capacity: usize,
}

impl SampleRing {
    /// Create new ring buffer
    ///
    /// # Arguments
    /// * `capacity` - Buffer capacity in samples (not frames)
    pub fn new(capacity: usize) -> Self {
        let rb = HeapRb::<i16>::new(capacity);
        let (producer, consumer) = rb.split();

        Self {
            producer,
            consumer,
            overrun: Arc::new(AtomicBool::new(false)),
            capacity,
        }
    }

    /// Split into producer and consumer ends
    pub fn split(self) -> (SampleProducer, SampleConsumer) {
        (
            SampleProducer {
                producer: self.producer,
                overrun: Arc::clone(&self.overrun),
            },
            SampleConsumer {
                consumer: self.consumer,
                overrun: self.overrun,
                capacity: self.capacity,
            },
        )
    }
}

/// Writing end, owned by the capture callback
pub struct SampleProducer {
    producer: HeapProducer<i16>,
    overrun: Arc<AtomicBool>,
}

impl SampleProducer {
    /// Push samples; anything that does not fit is lost and flagged
    ///
    /// # Returns
    /// Number of samples actually written
    pub fn write(&mut self, samples: &[i16]) -> usize {
        let written = self.producer.push_slice(samples);
        if written < samples.len() {
            self.overrun.store(true, Ordering::Release);
        }
        written
    }
}

/// Reading end, owned by the capture session
pub struct SampleConsumer {
    consumer: HeapConsumer<i16>,
    overrun: Arc<AtomicBool>,
    capacity: usize,
}

impl SampleConsumer {
    /// Pop up to `buffer.len()` samples
    pub fn read(&mut self, buffer: &mut [i16]) -> usize {
        self.consumer.pop_slice(buffer)
    }

    /// Consume the overrun flag
    ///
    /// Returns true exactly once per overrun episode.
    pub fn take_overrun(&self) -> bool {
        self.overrun.swap(false, Ordering::AcqRel)
    }

    /// Discard everything buffered and clear the overrun flag
    ///
    /// # Returns
    /// Number of samples discarded
    pub fn reset(&mut self) -> usize {
        let mut scratch = [0i16; 256];
        let mut discarded = 0;
        loop {
            let n = self.consumer.pop_slice(&mut scratch);
            if n == 0 {
                break;
            }
            discarded += n;
        }
        self.overrun.store(false, Ordering::Release);
        discarded
    }

    /// Get number of available samples
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
