/// Hotword detector main module
///
/// Two phases: a [`DetectorBuilder`] collects hotwords, handlers and engine
/// settings; [`DetectorBuilder::start`] consumes it and returns a
/// [`DetectorSession`] that streams audio through the engine and routes
/// every result to the registered handlers.

use crate::engine::{
    self, AudioFormat, DetectionOutcome, EngineAdapter, EngineBackend, EngineSettings,
};
use crate::error::DetectorError;
use crate::handler::{handler_fn, Handler};
use crate::hotword::{Hotword, HotwordRegistry, SILENCE_KEYWORD};
use crate::router::{Dispatch, HandlerBinding, Router};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Bytes read from the source per detection call
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Delay before retrying a source that has no data yet
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Audio gain applied by the engine unless configured otherwise
pub const DEFAULT_AUDIO_GAIN: f32 = 1.0;

/// Registration phase of a detector
pub struct DetectorBuilder {
    resource: PathBuf,
    audio_gain: f32,
    chunk_size: usize,
    poll_interval: Duration,
    registry: HotwordRegistry,
    bindings: Vec<HandlerBinding>,
    silence: Option<HandlerBinding>,
    silence_threshold: Duration,
}

impl DetectorBuilder {
    /// Create a builder for the given engine resource bundle
    pub fn new(resource: impl Into<PathBuf>) -> Self {
        Self {
            resource: resource.into(),
            audio_gain: DEFAULT_AUDIO_GAIN,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            registry: HotwordRegistry::new(),
            bindings: Vec::new(),
            silence: None,
            silence_threshold: Duration::ZERO,
        }
    }

    pub fn audio_gain(mut self, audio_gain: f32) -> Self {
        self.audio_gain = audio_gain;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Install a handler for a hotword
    ///
    /// Hotwords are reported by the engine in registration order.
    pub fn handle<H>(mut self, hotword: Hotword, handler: H) -> Self
    where
        H: Handler + Send + 'static,
    {
        debug!("Registering hotword '{}' ({})", hotword.name(), hotword.model());
        self.bindings
            .push(HandlerBinding::new(hotword.name(), Box::new(handler)));
        self.registry.register(hotword);
        self
    }

    /// Install a closure as the handler for a hotword
    pub fn handle_fn<F>(self, hotword: Hotword, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.handle(hotword, handler_fn(f))
    }

    /// Install the handler for sustained silence
    ///
    /// Replaces any previously installed silence handler.
    pub fn handle_silence<H>(mut self, threshold: Duration, handler: H) -> Self
    where
        H: Handler + Send + 'static,
    {
        if self.silence.is_some() {
            warn!("Replacing existing silence handler");
        }
        self.silence_threshold = threshold;
        self.silence = Some(HandlerBinding::new(SILENCE_KEYWORD, Box::new(handler)));
        self
    }

    /// Install a closure as the handler for sustained silence
    pub fn handle_silence_fn<F>(self, threshold: Duration, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.handle_silence(threshold, handler_fn(f))
    }

    pub fn resource(&self) -> &Path {
        &self.resource
    }

    pub fn hotwords(&self) -> &HotwordRegistry {
        &self.registry
    }

    /// Settings the engine will be constructed with
    pub fn engine_settings(&self) -> EngineSettings {
        self.registry.encode(&self.resource, self.audio_gain)
    }

    /// Validate builder parameters
    pub fn validate(&self) -> Result<(), DetectorError> {
        if !self.audio_gain.is_finite() || self.audio_gain <= 0.0 {
            return Err(DetectorError::Config(format!(
                "audio gain must be a positive number, got {}",
                self.audio_gain
            )));
        }

        if self.chunk_size == 0 || self.chunk_size % 2 != 0 {
            return Err(DetectorError::Config(format!(
                "chunk size must be a non-zero even number of bytes, got {}",
                self.chunk_size
            )));
        }

        if self.registry.is_empty() && self.silence.is_none() {
            warn!("No hotwords or silence handler registered");
        }

        Ok(())
    }

    /// Finish registration using the default engine backend
    pub fn start(self) -> Result<DetectorSession, DetectorError> {
        self.start_with(engine::default_backend())
    }

    /// Finish registration with an explicit engine backend
    ///
    /// The engine itself is constructed lazily, on the first detection or
    /// format query.
    pub fn start_with(
        self,
        backend: Box<dyn EngineBackend>,
    ) -> Result<DetectorSession, DetectorError> {
        self.validate()?;

        let settings = self.engine_settings();
        info!(
            "Starting detector session: {} hotword(s), silence handler: {}",
            self.registry.len(),
            self.silence.is_some()
        );

        Ok(DetectorSession {
            engine: EngineAdapter::new(backend, settings),
            router: Router::new(self.bindings, self.silence, self.silence_threshold),
            chunk_size: self.chunk_size,
            poll_interval: self.poll_interval,
            stats: SessionStats::default(),
        })
    }
}

/// Counters for one detector session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub chunks_processed: u64,
    pub bytes_consumed: u64,
    pub keywords_detected: u64,
    pub silence_events: u64,
    /// Times the source had no data and the loop backed off
    pub polls: u64,
}

/// Active detector bound to one engine instance
pub struct DetectorSession {
    engine: EngineAdapter,
    router: Router,
    chunk_size: usize,
    poll_interval: Duration,
    stats: SessionStats,
}

impl DetectorSession {
    /// Read audio from `source` until end-of-stream, routing every chunk
    ///
    /// Returns cleanly at end-of-stream. Engine failures, unbound results,
    /// handler errors and source errors abort the loop.
    pub fn read_and_detect<R: Read>(&mut self, mut source: R) -> Result<(), DetectorError> {
        self.engine.initialize()?;

        let mut buf = vec![0u8; self.chunk_size];

        loop {
            match source.read(&mut buf) {
                Ok(0) => {
                    debug!("End of audio stream");
                    // Read never hands back data together with end-of-stream,
                    // so the final pass sees an empty tail.
                    self.process_chunk(&buf[..0])?;
                    return Ok(());
                }
                Ok(n) => {
                    self.process_chunk(&buf[..n])?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    trace!("No audio available, retrying in {:?}", self.poll_interval);
                    self.stats.polls += 1;
                    std::thread::sleep(self.poll_interval);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(DetectorError::Source(e)),
            }
        }
    }

    /// Run detection on one chunk of PCM bytes and route the outcome
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<Dispatch, DetectorError> {
        let outcome = self.engine.run_detection(chunk)?;

        let chunk_duration = match outcome {
            DetectionOutcome::Silence => self.engine.audio_format()?.duration_of(chunk.len())?,
            _ => Duration::ZERO,
        };

        if !chunk.is_empty() {
            self.stats.chunks_processed += 1;
            self.stats.bytes_consumed += chunk.len() as u64;
        }

        let dispatch = self.router.route(outcome, chunk_duration)?;
        match dispatch {
            Dispatch::Keyword(_) => self.stats.keywords_detected += 1,
            Dispatch::Silence => self.stats.silence_events += 1,
            Dispatch::Idle | Dispatch::SilenceSuppressed => {}
        }

        if self.stats.chunks_processed > 0 && self.stats.chunks_processed % 1000 == 0 {
            debug!(
                "Processed {} chunks, detected {} hotwords",
                self.stats.chunks_processed, self.stats.keywords_detected
            );
        }

        Ok(dispatch)
    }

    /// Audio format the engine expects; initializes the engine if needed
    pub fn audio_format(&mut self) -> Result<AudioFormat, DetectorError> {
        self.engine.audio_format()
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_initialized()
    }

    /// Release the engine
    ///
    /// Fails if the engine was never initialized or was already released.
    pub fn close(&mut self) -> Result<(), DetectorError> {
        self.engine.release()?;
        info!(
            "Detector session closed: {} chunks, {} hotwords, {} silence events",
            self.stats.chunks_processed, self.stats.keywords_detected, self.stats.silence_events
        );
        Ok(())
    }

    /// Get current statistics
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Silence accumulated across consecutive silent chunks
    pub fn silence_elapsed(&self) -> Duration {
        self.router.silence_elapsed()
    }

    pub fn engine_settings(&self) -> &EngineSettings {
        self.engine.settings()
    }
}
