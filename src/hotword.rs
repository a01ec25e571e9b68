/// Hotword definitions and the ordered registry
///
/// The registry's order is the engine's configuration order: the Nth
/// registered hotword (1-indexed) is reported by the engine as result code N.

use crate::engine::EngineSettings;
use crate::error::DetectorError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model file extensions stripped when deriving a hotword name
/// (universal and personal models)
pub const MODEL_EXTENSIONS: [&str; 2] = [".umdl", ".pmdl"];

/// Sensitivity used when only a model is given
pub const DEFAULT_SENSITIVITY: f32 = 0.5;

/// Keyword passed to the silence handler
pub const SILENCE_KEYWORD: &str = "silence";

/// A model reference plus its detection sensitivity and display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotword {
    model: String,
    sensitivity: f32,
    name: String,
}

impl Hotword {
    /// Create a hotword, deriving its name from the model path
    pub fn new(model: impl Into<String>, sensitivity: f32) -> Result<Self, DetectorError> {
        let model = model.into();
        let name = derive_name(&model)?;
        Self::named(model, sensitivity, name)
    }

    /// Create a hotword with the default sensitivity of 0.5
    pub fn with_default_sensitivity(model: impl Into<String>) -> Result<Self, DetectorError> {
        Self::new(model, DEFAULT_SENSITIVITY)
    }

    /// Create a hotword with an explicit name
    pub fn named(
        model: impl Into<String>,
        sensitivity: f32,
        name: impl Into<String>,
    ) -> Result<Self, DetectorError> {
        let model = model.into();
        let name = name.into();

        if model.is_empty() {
            return Err(DetectorError::InvalidHotword("model path is empty".to_string()));
        }

        // The engine receives models as a comma-joined list
        if model.contains(',') {
            return Err(DetectorError::InvalidHotword(format!(
                "model path must not contain ',': {}",
                model
            )));
        }

        if !(0.0..=1.0).contains(&sensitivity) {
            return Err(DetectorError::InvalidHotword(format!(
                "sensitivity must be between 0.0 and 1.0, got {}",
                sensitivity
            )));
        }

        if name.is_empty() {
            return Err(DetectorError::InvalidHotword("name is empty".to_string()));
        }

        Ok(Self {
            model,
            sensitivity,
            name,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Name passed to the handler when this hotword is detected
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Derive a display name from a model path
///
/// Strips a known model extension, then takes the final path segment:
/// `"resources/models/alexa.umdl"` becomes `"alexa"`.
pub fn derive_name(model: &str) -> Result<String, DetectorError> {
    let stem = MODEL_EXTENSIONS
        .iter()
        .find_map(|ext| model.strip_suffix(*ext))
        .unwrap_or(model);

    let name = stem
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    if name.is_empty() {
        return Err(DetectorError::InvalidHotword(format!(
            "cannot derive a name from model path '{}'",
            model
        )));
    }

    Ok(name.to_string())
}

/// Ordered list of registered hotwords
#[derive(Debug, Clone, Default)]
pub struct HotwordRegistry {
    hotwords: Vec<Hotword>,
}

impl HotwordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hotword and return the result code it will be reported under
    pub fn register(&mut self, hotword: Hotword) -> i32 {
        self.hotwords.push(hotword);
        self.hotwords.len() as i32
    }

    /// Look up the hotword reported under a result code
    pub fn get(&self, code: i32) -> Option<&Hotword> {
        let index = usize::try_from(code).ok()?.checked_sub(1)?;
        self.hotwords.get(index)
    }

    pub fn len(&self) -> usize {
        self.hotwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotwords.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hotword> {
        self.hotwords.iter()
    }

    /// Comma-joined model paths in registration order
    pub fn joined_models(&self) -> String {
        self.hotwords
            .iter()
            .map(Hotword::model)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Comma-joined sensitivities, two decimal places each
    pub fn joined_sensitivities(&self) -> String {
        self.hotwords
            .iter()
            .map(|h| format!("{:.2}", h.sensitivity()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Encode the registry into engine construction settings
    pub fn encode(&self, resource: impl Into<PathBuf>, audio_gain: f32) -> EngineSettings {
        EngineSettings {
            resource: resource.into(),
            models: self.joined_models(),
            sensitivities: self.joined_sensitivities(),
            audio_gain,
        }
    }
}
