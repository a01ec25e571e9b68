/// Routing and silence tracking
///
/// Turns decoded detection outcomes into handler invocations. Silence is
/// only reported once consecutive silent chunks add up to the configured
/// threshold; any other outcome resets the accumulated silence.

use crate::engine::{DetectionOutcome, RESULT_SILENCE};
use crate::error::DetectorError;
use crate::handler::Handler;
use crate::hotword::SILENCE_KEYWORD;
use std::time::Duration;
use tracing::{debug, error, trace};

/// A handler together with the keyword it is invoked with
pub struct HandlerBinding {
    handler: Box<dyn Handler + Send>,
    keyword: String,
}

impl HandlerBinding {
    pub fn new(keyword: impl Into<String>, handler: Box<dyn Handler + Send>) -> Self {
        Self {
            handler,
            keyword: keyword.into(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    fn call(&mut self) -> Result<(), DetectorError> {
        self.handler
            .detected(&self.keyword)
            .map_err(|source| DetectorError::Handler {
                keyword: self.keyword.clone(),
                source,
            })
    }
}

impl std::fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("keyword", &self.keyword)
            .finish_non_exhaustive()
    }
}

/// What the router did with one outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing detected
    Idle,
    /// Silence seen but the threshold has not been reached yet
    SilenceSuppressed,
    /// Silence handler invoked
    Silence,
    /// Keyword handler invoked for this 1-based hotword index
    Keyword(usize),
}

/// Maps outcomes to handlers and tracks accumulated silence
#[derive(Debug)]
pub struct Router {
    keywords: Vec<HandlerBinding>,
    silence: Option<HandlerBinding>,
    silence_threshold: Duration,
    silence_elapsed: Duration,
}

impl Router {
    /// Create a router
    ///
    /// `keywords[i]` handles result code `i + 1`.
    pub fn new(
        keywords: Vec<HandlerBinding>,
        silence: Option<HandlerBinding>,
        silence_threshold: Duration,
    ) -> Self {
        Self {
            keywords,
            silence,
            silence_threshold,
            silence_elapsed: Duration::ZERO,
        }
    }

    /// Silence accumulated across consecutive silent chunks
    pub fn silence_elapsed(&self) -> Duration {
        self.silence_elapsed
    }

    /// Route one outcome
    ///
    /// `chunk_duration` is the playback length of the chunk that produced
    /// the outcome; it only matters for silence.
    pub fn route(
        &mut self,
        outcome: DetectionOutcome,
        chunk_duration: Duration,
    ) -> Result<Dispatch, DetectorError> {
        match outcome {
            DetectionOutcome::EngineError => {
                error!("Recognition engine reported an error");
                Err(DetectorError::EngineFailure)
            }

            DetectionOutcome::NoDetection => {
                self.silence_elapsed = Duration::ZERO;
                Ok(Dispatch::Idle)
            }

            DetectionOutcome::Silence => {
                self.silence_elapsed += chunk_duration;

                if self.silence_elapsed < self.silence_threshold {
                    trace!(
                        "Silence {:?} of {:?}, suppressed",
                        self.silence_elapsed,
                        self.silence_threshold
                    );
                    return Ok(Dispatch::SilenceSuppressed);
                }

                debug!("Silence threshold reached after {:?}", self.silence_elapsed);
                self.silence_elapsed = Duration::ZERO;

                match self.silence.as_mut() {
                    Some(binding) => {
                        binding.call()?;
                        Ok(Dispatch::Silence)
                    }
                    None => Err(DetectorError::UnboundResult {
                        code: RESULT_SILENCE,
                    }),
                }
            }

            DetectionOutcome::Keyword(index) => {
                self.silence_elapsed = Duration::ZERO;

                let binding = index
                    .checked_sub(1)
                    .and_then(|i| self.keywords.get_mut(i))
                    .ok_or(DetectorError::UnboundResult {
                        code: outcome.code(),
                    })?;

                debug!("Hotword detected: {} (index {})", binding.keyword(), index);
                binding.call()?;
                Ok(Dispatch::Keyword(index))
            }
        }
    }
}
