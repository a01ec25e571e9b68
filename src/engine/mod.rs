/// Recognition engine boundary
///
/// The engine itself is an external collaborator. This module defines the
/// seam it plugs into, decodes its integer result codes into
/// [`DetectionOutcome`] and owns its lifecycle through [`EngineAdapter`].

pub mod energy;
#[cfg(feature = "snowboy")]
pub mod snowboy;

pub use energy::{EnergyBackend, EnergyEngine};
#[cfg(feature = "snowboy")]
pub use snowboy::{SnowboyBackend, SnowboyEngine};

use crate::error::DetectorError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Engine result code for sustained silence
pub const RESULT_SILENCE: i32 = -2;
/// Engine result code for an internal engine error
pub const RESULT_ERROR: i32 = -1;
/// Engine result code when nothing was detected
pub const RESULT_NO_DETECTION: i32 = 0;

/// Outcome of one detection call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    NoDetection,
    EngineError,
    Silence,
    /// 1-based index of the registered hotword
    Keyword(usize),
}

impl DetectionOutcome {
    /// Decode a raw engine result code
    ///
    /// Negative codes other than silence are treated as engine errors.
    pub fn from_code(code: i32) -> Self {
        match code {
            RESULT_NO_DETECTION => DetectionOutcome::NoDetection,
            RESULT_SILENCE => DetectionOutcome::Silence,
            k if k > 0 => DetectionOutcome::Keyword(k as usize),
            _ => DetectionOutcome::EngineError,
        }
    }

    /// Raw result code this outcome was decoded from
    pub fn code(&self) -> i32 {
        match self {
            DetectionOutcome::NoDetection => RESULT_NO_DETECTION,
            DetectionOutcome::EngineError => RESULT_ERROR,
            DetectionOutcome::Silence => RESULT_SILENCE,
            DetectionOutcome::Keyword(k) => *k as i32,
        }
    }
}

/// PCM layout reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Create a new audio format
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// 16kHz, mono, 16-bit PCM
    pub fn pcm16_mono() -> Self {
        Self::new(16000, 1, 16)
    }

    /// Bytes of audio per second of wall-clock time
    pub fn bytes_per_second(&self) -> u64 {
        self.channels as u64 * (self.bits_per_sample / 8) as u64 * self.sample_rate as u64
    }

    /// Playback duration of `byte_len` bytes of audio in this format
    pub fn duration_of(&self, byte_len: usize) -> Result<Duration, DetectorError> {
        let bytes_per_second = self.bytes_per_second();
        if bytes_per_second == 0 {
            return Err(DetectorError::InvalidAudioFormat(format!(
                "{} Hz, {} channel(s), {} bits per sample",
                self.sample_rate, self.channels, self.bits_per_sample
            )));
        }

        let nanos = byte_len as u128 * 1_000_000_000 / bytes_per_second as u128;
        Ok(Duration::from_nanos(nanos as u64))
    }
}

/// Everything the engine needs at construction time
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Path to the engine's common resource bundle
    pub resource: PathBuf,

    /// Comma-joined model paths, in result-code order
    pub models: String,

    /// Comma-joined sensitivities matching `models`
    pub sensitivities: String,

    pub audio_gain: f32,
}

impl EngineSettings {
    /// Number of models in the joined model list
    pub fn model_count(&self) -> usize {
        self.models.split(',').filter(|m| !m.is_empty()).count()
    }
}

/// A constructed recognition engine instance
#[cfg_attr(test, mockall::automock)]
pub trait RecognitionEngine: Send {
    /// Run detection over a chunk of 16-bit samples and return the raw result code
    fn run_detection(&mut self, samples: &[i16]) -> i32;

    fn sample_rate(&self) -> u32;

    fn num_channels(&self) -> u16;

    fn bits_per_sample(&self) -> u16;

    /// Number of hotwords the engine was configured with
    fn num_hotwords(&self) -> usize;
}

/// Constructs recognition engines from encoded settings
pub trait EngineBackend: Send {
    fn create(
        &mut self,
        settings: &EngineSettings,
    ) -> Result<Box<dyn RecognitionEngine>, DetectorError>;
}

impl<F> EngineBackend for F
where
    F: FnMut(&EngineSettings) -> Result<Box<dyn RecognitionEngine>, DetectorError> + Send,
{
    fn create(
        &mut self,
        settings: &EngineSettings,
    ) -> Result<Box<dyn RecognitionEngine>, DetectorError> {
        self(settings)
    }
}

/// Backend used when none is given explicitly
#[cfg(feature = "snowboy")]
pub fn default_backend() -> Box<dyn EngineBackend> {
    Box::new(SnowboyBackend::default())
}

/// Backend used when none is given explicitly
#[cfg(not(feature = "snowboy"))]
pub fn default_backend() -> Box<dyn EngineBackend> {
    warn!("Using energy-based engine (snowboy feature not enabled)");
    Box::new(EnergyBackend::default())
}

enum EngineState {
    Uninitialized,
    Active(Box<dyn RecognitionEngine>),
    Released,
}

/// Owns the engine instance and its lifecycle
///
/// The engine is constructed lazily on first use and released exactly once.
pub struct EngineAdapter {
    backend: Box<dyn EngineBackend>,
    settings: EngineSettings,
    state: EngineState,
    format: Option<AudioFormat>,
    samples: Vec<i16>,
}

impl EngineAdapter {
    pub fn new(backend: Box<dyn EngineBackend>, settings: EngineSettings) -> Self {
        Self {
            backend,
            settings,
            state: EngineState::Uninitialized,
            format: None,
            samples: Vec::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, EngineState::Active(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self.state, EngineState::Released)
    }

    /// Construct the engine if it has not been constructed yet
    pub fn initialize(&mut self) -> Result<(), DetectorError> {
        self.engine().map(|_| ())
    }

    fn engine(&mut self) -> Result<&mut Box<dyn RecognitionEngine>, DetectorError> {
        match self.state {
            EngineState::Active(_) => {}
            EngineState::Released => {
                return Err(DetectorError::Lifecycle(
                    "engine used after release".to_string(),
                ));
            }
            EngineState::Uninitialized => {
                info!("Initializing recognition engine");
                info!("Resource: {}", self.settings.resource.display());
                info!("Models: {}", self.settings.models);
                info!("Sensitivities: {}", self.settings.sensitivities);
                info!("Audio gain: {}", self.settings.audio_gain);

                let engine = self.backend.create(&self.settings)?;

                let expected = self.settings.model_count();
                if engine.num_hotwords() != expected {
                    return Err(DetectorError::EngineInit(format!(
                        "engine reports {} hotwords, {} registered",
                        engine.num_hotwords(),
                        expected
                    )));
                }

                self.state = EngineState::Active(engine);
            }
        }

        match &mut self.state {
            EngineState::Active(engine) => Ok(engine),
            _ => Err(DetectorError::Lifecycle("engine not initialized".to_string())),
        }
    }

    /// Run detection over a chunk of little-endian 16-bit PCM bytes
    ///
    /// A chunk shorter than one sample short-circuits to
    /// [`DetectionOutcome::NoDetection`] without touching the engine. It is
    /// routed like any other no-detection result, so it clears accumulated
    /// silence even though the engine never saw it. A trailing odd byte is
    /// ignored.
    pub fn run_detection(&mut self, chunk: &[u8]) -> Result<DetectionOutcome, DetectorError> {
        if self.is_released() {
            return Err(DetectorError::Lifecycle(
                "detection requested after release".to_string(),
            ));
        }

        if chunk.len() < 2 {
            return Ok(DetectionOutcome::NoDetection);
        }

        self.samples.clear();
        self.samples.extend(
            chunk
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );

        self.initialize()?;

        let samples = &self.samples;
        match &mut self.state {
            EngineState::Active(engine) => {
                Ok(DetectionOutcome::from_code(engine.run_detection(samples)))
            }
            _ => Err(DetectorError::Lifecycle("engine not initialized".to_string())),
        }
    }

    /// Audio format the engine expects
    ///
    /// Initializes the engine if needed; the format is cached afterwards.
    pub fn audio_format(&mut self) -> Result<AudioFormat, DetectorError> {
        if self.is_released() {
            return Err(DetectorError::Lifecycle(
                "audio format requested after release".to_string(),
            ));
        }

        if let Some(format) = self.format {
            return Ok(format);
        }

        let engine = self.engine()?;
        let format = AudioFormat::new(
            engine.sample_rate(),
            engine.num_channels(),
            engine.bits_per_sample(),
        );
        debug!("Engine audio format: {:?}", format);

        self.format = Some(format);
        Ok(format)
    }

    /// Release the engine
    ///
    /// Fails if the engine was never initialized or was already released.
    pub fn release(&mut self) -> Result<(), DetectorError> {
        match std::mem::replace(&mut self.state, EngineState::Released) {
            EngineState::Active(engine) => {
                drop(engine);
                self.format = None;
                info!("Recognition engine released");
                Ok(())
            }
            EngineState::Uninitialized => {
                self.state = EngineState::Uninitialized;
                Err(DetectorError::Lifecycle(
                    "engine was never initialized".to_string(),
                ))
            }
            EngineState::Released => Err(DetectorError::Lifecycle(
                "engine already released".to_string(),
            )),
        }
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        if self.is_initialized() {
            debug!("Releasing recognition engine on drop");
        }
    }
}
