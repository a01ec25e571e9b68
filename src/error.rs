/// Error types for hotword detection
///
/// Every failure surfaces to the caller of the streaming entry point.
/// Nothing is retried internally.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    /// The recognition engine reported an unrecoverable per-chunk error
    #[error("Recognition engine failure")]
    EngineFailure,

    /// A keyword or silence result arrived with no handler registered for it
    #[error("No handler installed for result code {code}")]
    UnboundResult { code: i32 },

    /// Release before initialization, double release, or use after release
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Error from the underlying audio source (end-of-stream is not an error)
    #[error("Audio source error: {0}")]
    Source(#[from] std::io::Error),

    /// A handler returned an error while processing a detection
    #[error("Handler for '{keyword}' failed: {source}")]
    Handler {
        keyword: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid hotword: {0}")]
    InvalidHotword(String),

    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl DetectorError {
    /// Whether the error came from misconfiguration rather than the audio path
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DetectorError::UnboundResult { .. }
                | DetectorError::InvalidHotword(_)
                | DetectorError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DetectorError::UnboundResult { code: 3 };
        assert_eq!(err.to_string(), "No handler installed for result code 3");

        let err = DetectorError::EngineFailure;
        assert_eq!(err.to_string(), "Recognition engine failure");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: DetectorError = io.into();
        assert!(matches!(err, DetectorError::Source(_)));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_handler_error_keeps_source() {
        let err = DetectorError::Handler {
            keyword: "alexa".to_string(),
            source: anyhow::anyhow!("downstream unavailable"),
        };
        assert!(err.to_string().contains("alexa"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_configuration_classification() {
        assert!(DetectorError::UnboundResult { code: -2 }.is_configuration());
        assert!(!DetectorError::Lifecycle("released".to_string()).is_configuration());
    }
}
