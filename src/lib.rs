/// Hotword detector library
///
/// This library streams PCM audio through a wake-word recognition engine,
/// routes each result to the handler registered for it and reports
/// sustained silence once it has lasted long enough.

pub mod audio_buffer;
#[cfg(feature = "microphone")]
pub mod capture;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod handler;
pub mod hotword;
pub mod router;
pub mod wav;

// Re-export main types
pub use audio_buffer::{AudioBufferError, AudioSample, PcmProducer, PcmRingBuffer, PcmSource};
pub use config::{DetectorSettings, HotwordSettings};
pub use detector::{DetectorBuilder, DetectorSession, SessionStats};
pub use engine::{
    AudioFormat, DetectionOutcome, EnergyBackend, EngineBackend, EngineSettings,
    RecognitionEngine,
};
pub use error::DetectorError;
pub use handler::{handler_fn, ChannelHandler, Handler, HandlerFn, HotwordEvent};
pub use hotword::{derive_name, Hotword, HotwordRegistry, SILENCE_KEYWORD};
pub use router::{Dispatch, Router};
pub use wav::WavSource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
