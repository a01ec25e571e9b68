/// Detector configuration
///
/// Settings can come from a JSON file, with environment variables applied
/// on top. [`DetectorSettings::into_builder`] turns them into a
/// [`DetectorBuilder`] with one handler per hotword.

use crate::detector::{
    DetectorBuilder, DEFAULT_AUDIO_GAIN, DEFAULT_CHUNK_SIZE, DEFAULT_POLL_INTERVAL,
};
use crate::engine::energy::DEFAULT_SILENCE_FLOOR;
use crate::engine::EngineBackend;
#[cfg(not(feature = "snowboy"))]
use crate::engine::EnergyBackend;
use crate::error::DetectorError;
use crate::handler::Handler;
use crate::hotword::{Hotword, DEFAULT_SENSITIVITY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding the resource bundle path
pub const ENV_RESOURCE: &str = "HOTWORD_RESOURCE";
/// Environment variable overriding the audio gain
pub const ENV_AUDIO_GAIN: &str = "HOTWORD_AUDIO_GAIN";
/// Environment variable overriding the silence threshold in milliseconds
pub const ENV_SILENCE_MS: &str = "HOTWORD_SILENCE_MS";

/// One hotword entry in a settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotwordSettings {
    /// Path to the model file
    pub model: String,

    /// Sensitivity (0.0 - 1.0); defaults to 0.5
    #[serde(default)]
    pub sensitivity: Option<f32>,

    /// Name passed to handlers; derived from the model path if absent
    #[serde(default)]
    pub name: Option<String>,
}

impl HotwordSettings {
    pub fn to_hotword(&self) -> Result<Hotword, DetectorError> {
        let sensitivity = self.sensitivity.unwrap_or(DEFAULT_SENSITIVITY);
        match &self.name {
            Some(name) => Hotword::named(self.model.as_str(), sensitivity, name.as_str()),
            None => Hotword::new(self.model.as_str(), sensitivity),
        }
    }
}

/// Full detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Path to the engine's common resource bundle
    pub resource: PathBuf,

    /// Audio gain applied by the engine
    pub audio_gain: f32,

    /// Bytes read from the source per detection call
    pub chunk_size: usize,

    /// Back-off when the source has no data yet, in milliseconds
    pub poll_interval_ms: u64,

    /// Hotwords in result-code order
    pub hotwords: Vec<HotwordSettings>,

    /// Silence threshold in milliseconds; no silence handler when absent
    pub silence_threshold_ms: Option<u64>,

    /// RMS level (0.0 - 1.0) below which the energy engine reports silence
    pub silence_floor: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            resource: PathBuf::from("resources/common.res"),
            audio_gain: DEFAULT_AUDIO_GAIN,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            hotwords: Vec::new(),
            silence_threshold_ms: None,
            silence_floor: DEFAULT_SILENCE_FLOOR,
        }
    }
}

impl DetectorSettings {
    /// Load settings from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        info!("Loading detector settings from {}", path.display());

        let contents = std::fs::read_to_string(path).map_err(|e| {
            DetectorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// Parse settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self, DetectorError> {
        serde_json::from_str(json)
            .map_err(|e| DetectorError::Config(format!("invalid settings: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), DetectorError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DetectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(resource) = lookup(ENV_RESOURCE) {
            debug!("{} override: {}", ENV_RESOURCE, resource);
            self.resource = PathBuf::from(resource);
        }

        if let Some(gain) = lookup(ENV_AUDIO_GAIN) {
            self.audio_gain = gain.trim().parse().map_err(|_| {
                DetectorError::Config(format!("{} is not a number: {}", ENV_AUDIO_GAIN, gain))
            })?;
            debug!("{} override: {}", ENV_AUDIO_GAIN, self.audio_gain);
        }

        if let Some(silence) = lookup(ENV_SILENCE_MS) {
            let ms = silence.trim().parse().map_err(|_| {
                DetectorError::Config(format!(
                    "{} is not a whole number of milliseconds: {}",
                    ENV_SILENCE_MS, silence
                ))
            })?;
            self.silence_threshold_ms = Some(ms);
            debug!("{} override: {}ms", ENV_SILENCE_MS, ms);
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), DetectorError> {
        if !self.audio_gain.is_finite() || self.audio_gain <= 0.0 {
            return Err(DetectorError::Config(format!(
                "audio_gain must be a positive number, got {}",
                self.audio_gain
            )));
        }

        if self.chunk_size == 0 || self.chunk_size % 2 != 0 {
            return Err(DetectorError::Config(format!(
                "chunk_size must be a non-zero even number of bytes, got {}",
                self.chunk_size
            )));
        }

        if !(0.0..=1.0).contains(&self.silence_floor) {
            return Err(DetectorError::Config(format!(
                "silence_floor must be between 0.0 and 1.0, got {}",
                self.silence_floor
            )));
        }

        self.hotwords()?;
        Ok(())
    }

    /// Engine backend for these settings
    #[cfg(feature = "snowboy")]
    pub fn backend(&self) -> Box<dyn EngineBackend> {
        crate::engine::default_backend()
    }

    /// Engine backend for these settings
    #[cfg(not(feature = "snowboy"))]
    pub fn backend(&self) -> Box<dyn EngineBackend> {
        Box::new(EnergyBackend::with_silence_floor(self.silence_floor))
    }

    /// Hotwords in result-code order
    pub fn hotwords(&self) -> Result<Vec<Hotword>, DetectorError> {
        self.hotwords.iter().map(HotwordSettings::to_hotword).collect()
    }

    pub fn silence_threshold(&self) -> Option<Duration> {
        self.silence_threshold_ms.map(Duration::from_millis)
    }

    /// Build a detector, creating one handler per hotword and one for silence
    pub fn into_builder<F, H>(&self, mut make_handler: F) -> Result<DetectorBuilder, DetectorError>
    where
        F: FnMut() -> H,
        H: Handler + Send + 'static,
    {
        self.validate()?;

        let mut builder = DetectorBuilder::new(&self.resource)
            .audio_gain(self.audio_gain)
            .chunk_size(self.chunk_size)
            .poll_interval(Duration::from_millis(self.poll_interval_ms));

        for hotword in self.hotwords()? {
            builder = builder.handle(hotword, make_handler());
        }

        if let Some(threshold) = self.silence_threshold() {
            builder = builder.handle_silence(threshold, make_handler());
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "resource": "resources/common.res",
        "audio_gain": 1.5,
        "hotwords": [
            { "model": "resources/models/alexa.umdl" },
            { "model": "resources/models/jarvis.pmdl", "sensitivity": 0.8, "name": "jarvis-pro" }
        ],
        "silence_threshold_ms": 2000
    }"#;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = DetectorSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.chunk_size, 2048);
        assert_eq!(settings.poll_interval_ms, 300);
    }

    #[test]
    fn test_parse_json() {
        let settings = DetectorSettings::from_json(SAMPLE).unwrap();
        assert_eq!(settings.audio_gain, 1.5);
        // Omitted fields fall back to defaults
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(settings.silence_threshold(), Some(Duration::from_secs(2)));

        let hotwords = settings.hotwords().unwrap();
        assert_eq!(hotwords[0].name(), "alexa");
        assert_eq!(hotwords[0].sensitivity(), DEFAULT_SENSITIVITY);
        assert_eq!(hotwords[1].name(), "jarvis-pro");
        assert_eq!(hotwords[1].sensitivity(), 0.8);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = DetectorSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.hotwords.len(), 2);
        assert!(DetectorSettings::from_file("missing/settings.json").is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            DetectorSettings::from_json("{ \"audio_gain\": \"loud\" }"),
            Err(DetectorError::Config(_))
        ));
    }

    #[test]
    fn test_validation() {
        let mut settings = DetectorSettings::default();
        settings.audio_gain = 0.0;
        assert!(settings.validate().is_err());

        settings.audio_gain = 1.0;
        settings.chunk_size = 1023;
        assert!(settings.validate().is_err());

        settings.chunk_size = 1024;
        settings.silence_floor = -0.1;
        assert!(matches!(settings.validate(), Err(DetectorError::Config(_))));

        settings.silence_floor = DEFAULT_SILENCE_FLOOR;
        settings.hotwords.push(HotwordSettings {
            model: "alexa.umdl".to_string(),
            sensitivity: Some(1.5),
            name: None,
        });
        assert!(matches!(settings.validate(), Err(DetectorError::InvalidHotword(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_RESOURCE, "/opt/common.res"),
            (ENV_AUDIO_GAIN, " 2.5 "),
            (ENV_SILENCE_MS, "750"),
        ]
        .into_iter()
        .collect();

        let mut settings = DetectorSettings::default();
        settings
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.resource, PathBuf::from("/opt/common.res"));
        assert_eq!(settings.audio_gain, 2.5);
        assert_eq!(settings.silence_threshold(), Some(Duration::from_millis(750)));
    }

    #[test]
    fn test_bad_override() {
        let mut settings = DetectorSettings::default();
        let result = settings.apply_overrides(|key| {
            (key == ENV_SILENCE_MS).then(|| "two seconds".to_string())
        });
        assert!(matches!(result, Err(DetectorError::Config(_))));
    }

    #[test]
    fn test_into_builder_registers_everything() {
        let settings = DetectorSettings::from_json(SAMPLE).unwrap();

        let mut created = 0;
        let builder = settings
            .into_builder(|| {
                created += 1;
                handler_fn(|_: &str| {})
            })
            .unwrap();

        // Two hotwords plus silence
        assert_eq!(created, 3);
        assert_eq!(builder.hotwords().len(), 2);

        let engine_settings = builder.engine_settings();
        assert_eq!(
            engine_settings.models,
            "resources/models/alexa.umdl,resources/models/jarvis.pmdl"
        );
        assert_eq!(engine_settings.sensitivities, "0.50,0.80");
        assert_eq!(engine_settings.audio_gain, 1.5);
    }

    #[cfg(not(feature = "snowboy"))]
    #[test]
    fn test_silence_floor_reaches_backend() {
        use crate::engine::AudioFormat;
        use crate::router::Dispatch;

        let mut settings = DetectorSettings::from_json(
            r#"{ "silence_threshold_ms": 0, "silence_floor": 0.5 }"#,
        )
        .unwrap();
        settings.hotwords.clear();

        let mut session = settings
            .into_builder(|| handler_fn(|_: &str| {}))
            .unwrap()
            .start_with(settings.backend())
            .unwrap();
        assert_eq!(session.audio_format().unwrap(), AudioFormat::pcm16_mono());

        // A quarter-scale square wave has RMS 0.25: sound at the default
        // floor, silence at 0.5
        let loud: Vec<u8> = [8192i16, -8192]
            .iter()
            .cycle()
            .take(512)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert_eq!(session.process_chunk(&loud).unwrap(), Dispatch::Silence);
    }
}
