/// WAV file audio source
///
/// Streams the samples of a 16-bit PCM WAV file as little-endian bytes.

use crate::engine::AudioFormat;
use crate::error::DetectorError;
use hound::{SampleFormat, WavIntoSamples, WavReader};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

/// [`Read`] adapter over the samples of a WAV file
pub struct WavSource<R: Read> {
    samples: WavIntoSamples<R, i16>,
    format: AudioFormat,
}

impl WavSource<BufReader<File>> {
    /// Open a WAV file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        debug!("Opening WAV source: {}", path.display());
        Self::new(WavReader::open(path)?)
    }
}

impl<R: Read> WavSource<R> {
    /// Wrap an already opened WAV reader
    pub fn new(reader: WavReader<R>) -> Result<Self, DetectorError> {
        let spec = reader.spec();

        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(DetectorError::InvalidAudioFormat(format!(
                "expected 16-bit integer PCM, got {} bits ({:?})",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        Ok(Self {
            samples: reader.into_samples::<i16>(),
            format: AudioFormat::new(spec.sample_rate, spec.channels, spec.bits_per_sample),
        })
    }

    /// Format declared in the WAV header
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Check the file's format against what the engine expects
    pub fn check_format(&self, expected: AudioFormat) -> Result<(), DetectorError> {
        if self.format != expected {
            warn!("WAV format {:?} does not match engine format {:?}", self.format, expected);
            return Err(DetectorError::InvalidAudioFormat(format!(
                "file is {} Hz / {} ch / {} bit, engine expects {} Hz / {} ch / {} bit",
                self.format.sample_rate,
                self.format.channels,
                self.format.bits_per_sample,
                expected.sample_rate,
                expected.channels,
                expected.bits_per_sample
            )));
        }
        Ok(())
    }
}

impl<R: Read> Read for WavSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;

        while written + 2 <= buf.len() {
            match self.samples.next() {
                Some(Ok(sample)) => {
                    buf[written..written + 2].copy_from_slice(&sample.to_le_bytes());
                    written += 2;
                }
                Some(Err(e)) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
                None => break,
            }
        }

        Ok(written)
    }
}
