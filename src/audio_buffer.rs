/// Audio buffer module for handing captured PCM to the detector
///
/// A lock-free byte ring split into a producer (capture side) and a
/// [`PcmSource`] that implements [`std::io::Read`] for the streaming loop.
/// While the ring is empty and the producer is still open, reads fail with
/// `WouldBlock`, which the loop treats as "no data yet".

use crate::engine::AudioFormat;
use cache_padded::CachePadded;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Audio sample format (16-bit PCM)
pub type AudioSample = i16;

/// Default ring duration
pub const BUFFER_DURATION_SECS: u64 = 3;

#[derive(Error, Debug)]
pub enum AudioBufferError {
    #[error("Invalid buffer size: {0} (must be a non-zero multiple of 2 bytes)")]
    InvalidSize(usize),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),
}

type RingBuffer = HeapRb<u8>;
type RingProducer = <RingBuffer as Split>::Prod;
type RingConsumer = <RingBuffer as Split>::Cons;

/// Constructor for connected producer/source pairs
pub struct PcmRingBuffer;

impl PcmRingBuffer {
    /// Create a pair holding 3 seconds of audio in `format`
    pub fn new(format: AudioFormat) -> Result<(PcmProducer, PcmSource), AudioBufferError> {
        if format.bits_per_sample != 16 {
            return Err(AudioBufferError::InvalidFormat(format!(
                "{} bits per sample, only 16-bit PCM is buffered",
                format.bits_per_sample
            )));
        }

        let capacity = BUFFER_DURATION_SECS * format.bytes_per_second();
        Self::with_capacity(format, capacity as usize)
    }

    /// Create a pair with a custom capacity in bytes
    pub fn with_capacity(
        format: AudioFormat,
        capacity: usize,
    ) -> Result<(PcmProducer, PcmSource), AudioBufferError> {
        if capacity == 0 || capacity % 2 != 0 {
            return Err(AudioBufferError::InvalidSize(capacity));
        }

        if format.bytes_per_second() == 0 {
            return Err(AudioBufferError::InvalidFormat(format!(
                "{} Hz, {} channel(s), {} bits per sample",
                format.sample_rate, format.channels, format.bits_per_sample
            )));
        }

        debug!(
            "Creating audio buffer with capacity: {} bytes ({} Hz, {} channel(s))",
            capacity, format.sample_rate, format.channels
        );

        let rb = RingBuffer::new(capacity);
        let (producer, consumer) = rb.split();
        let closed = Arc::new(CachePadded::new(AtomicBool::new(false)));

        Ok((
            PcmProducer {
                producer,
                closed: Arc::clone(&closed),
                dropped_bytes: 0,
            },
            PcmSource {
                consumer,
                closed,
                format,
            },
        ))
    }
}

/// Capture side of the ring
pub struct PcmProducer {
    producer: RingProducer,
    closed: Arc<CachePadded<AtomicBool>>,
    dropped_bytes: u64,
}

impl PcmProducer {
    /// Push samples as little-endian bytes
    ///
    /// Returns the number of samples written. When the ring is full the
    /// newest samples are dropped.
    pub fn push_samples(&mut self, samples: &[AudioSample]) -> usize {
        let room = self.producer.vacant_len() / 2;
        let to_write = samples.len().min(room);

        if to_write < samples.len() {
            let dropped = samples.len() - to_write;
            self.dropped_bytes += dropped as u64 * 2;
            warn!("Buffer full, dropping {} newest samples", dropped);
        }

        for sample in &samples[..to_write] {
            self.producer.push_slice(&sample.to_le_bytes());
        }

        to_write
    }

    /// Push raw PCM bytes; a trailing odd byte is never written
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        let room = self.producer.vacant_len() & !1;
        let whole = bytes.len() & !1;
        let to_write = whole.min(room);

        if to_write < bytes.len() {
            self.dropped_bytes += (bytes.len() - to_write) as u64;
            if to_write < whole {
                warn!("Buffer full, dropping {} newest bytes", whole - to_write);
            }
        }

        self.producer.push_slice(&bytes[..to_write])
    }

    /// Signal end-of-stream; the source reports EOF once drained
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::Release) {
            debug!("Audio producer closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Bytes discarded because the ring was full (or unaligned)
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    /// Get the amount of free space in bytes
    pub fn free_space(&self) -> usize {
        self.producer.vacant_len()
    }
}

impl Drop for PcmProducer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Detector side of the ring
pub struct PcmSource {
    consumer: RingConsumer,
    closed: Arc<CachePadded<AtomicBool>>,
    format: AudioFormat,
}

impl PcmSource {
    /// Get the number of bytes currently buffered
    pub fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.consumer.capacity().get()
    }

    /// Format of the buffered audio
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Get duration of audio currently in buffer (in seconds)
    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.format.bytes_per_second() as f32
    }
}

impl Read for PcmSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // Load before popping so everything pushed ahead of close() is seen
        let closed = self.closed.load(Ordering::Acquire);
        let read = self.consumer.pop_slice(buf);

        if read > 0 {
            Ok(read)
        } else if closed {
            Ok(0)
        } else {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no audio buffered yet"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small(capacity: usize) -> (PcmProducer, PcmSource) {
        PcmRingBuffer::with_capacity(AudioFormat::pcm16_mono(), capacity).unwrap()
    }

    #[test]
    fn test_buffer_creation() {
        let (producer, source) = PcmRingBuffer::new(AudioFormat::pcm16_mono()).unwrap();
        // 3 seconds of 16 kHz mono
        assert_eq!(source.capacity(), 96000);
        assert_eq!(producer.free_space(), 96000);
        assert!(source.is_empty());
    }

    #[test]
    fn test_capacity_follows_format() {
        let (_producer, source) = PcmRingBuffer::new(AudioFormat::new(44100, 2, 16)).unwrap();
        assert_eq!(source.capacity(), 3 * 44100 * 2 * 2);
        assert_eq!(source.format(), AudioFormat::new(44100, 2, 16));
    }

    #[test]
    fn test_invalid_capacity() {
        let format = AudioFormat::pcm16_mono();
        assert!(matches!(
            PcmRingBuffer::with_capacity(format, 0),
            Err(AudioBufferError::InvalidSize(0))
        ));
        assert!(PcmRingBuffer::with_capacity(format, 101).is_err());
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(
            PcmRingBuffer::new(AudioFormat::new(16000, 1, 8)),
            Err(AudioBufferError::InvalidFormat(_))
        ));
        assert!(matches!(
            PcmRingBuffer::with_capacity(AudioFormat::new(0, 1, 16), 64),
            Err(AudioBufferError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_samples_round_trip_as_little_endian() {
        let (mut producer, mut source) = small(64);
        assert_eq!(producer.push_samples(&[1, -2, 256]), 3);

        let mut buf = [0u8; 16];
        let n = source.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x00, 0xFE, 0xFF, 0x00, 0x01]);
    }

    #[test]
    fn test_empty_open_buffer_would_block() {
        let (_producer, mut source) = small(64);
        let mut buf = [0u8; 8];

        let err = source.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_close_drains_then_reports_eof() {
        let (mut producer, mut source) = small(64);
        producer.push_bytes(&[1, 2, 3, 4]);
        producer.close();

        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_dropping_producer_closes() {
        let (producer, mut source) = small(64);
        drop(producer);

        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_buffer_overflow_drops_newest() {
        let (mut producer, source) = small(8);

        assert_eq!(producer.push_samples(&[1; 6]), 4);
        assert_eq!(source.len(), 8);
        assert_eq!(producer.dropped_bytes(), 4);
        assert_eq!(producer.free_space(), 0);
    }

    #[test]
    fn test_odd_bytes_are_not_written() {
        let (mut producer, source) = small(16);

        assert_eq!(producer.push_bytes(&[1, 2, 3]), 2);
        assert_eq!(source.len(), 2);
        assert_eq!(producer.dropped_bytes(), 1);
    }

    #[test]
    fn test_duration_calculation() {
        let (mut producer, source) = PcmRingBuffer::new(AudioFormat::pcm16_mono()).unwrap();
        producer.push_samples(&vec![0; 16000]); // 1 second of audio

        assert_relative_eq!(source.duration_secs(), 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_stereo_duration() {
        let (mut producer, source) = PcmRingBuffer::new(AudioFormat::new(16000, 2, 16)).unwrap();
        // 1 second of interleaved stereo
        assert_eq!(producer.push_samples(&vec![0; 32000]), 32000);

        assert_relative_eq!(source.duration_secs(), 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_ring_buffer_wrapping() {
        let (mut producer, mut source) = small(8);
        let mut buf = [0u8; 4];

        producer.push_bytes(&[1; 8]);
        assert_eq!(source.read(&mut buf).unwrap(), 4);

        // Wraps around the end of the storage
        producer.push_bytes(&[2; 4]);
        let mut all = [0u8; 8];
        assert_eq!(source.read(&mut all).unwrap(), 8);
        assert_eq!(&all, &[1, 1, 1, 1, 2, 2, 2, 2]);
    }
}
