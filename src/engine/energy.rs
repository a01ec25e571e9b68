/// Energy-based stand-in engine
///
/// Used when the native detector library is not linked. It never reports a
/// keyword; it only distinguishes silence from sound using RMS energy, which
/// is enough to drive silence handlers and exercise the streaming path.

use super::{EngineBackend, EngineSettings, RecognitionEngine, RESULT_NO_DETECTION, RESULT_SILENCE};
use crate::error::DetectorError;
use tracing::{debug, trace, warn};

/// Sample rate reported by the energy engine
pub const ENERGY_SAMPLE_RATE: u32 = 16000;

/// Default RMS level (0.0 - 1.0) below which a chunk counts as silence
pub const DEFAULT_SILENCE_FLOOR: f32 = 0.02;

/// Constructs [`EnergyEngine`] instances
#[derive(Debug, Clone)]
pub struct EnergyBackend {
    /// RMS level below which a chunk is reported as silence
    pub silence_floor: f32,
}

impl Default for EnergyBackend {
    fn default() -> Self {
        Self {
            silence_floor: DEFAULT_SILENCE_FLOOR,
        }
    }
}

impl EnergyBackend {
    pub fn with_silence_floor(silence_floor: f32) -> Self {
        Self { silence_floor }
    }
}

impl EngineBackend for EnergyBackend {
    fn create(
        &mut self,
        settings: &EngineSettings,
    ) -> Result<Box<dyn RecognitionEngine>, DetectorError> {
        if !(0.0..=1.0).contains(&self.silence_floor) {
            return Err(DetectorError::EngineInit(format!(
                "silence floor must be between 0.0 and 1.0, got {}",
                self.silence_floor
            )));
        }

        if !settings.resource.exists() {
            // The energy engine has no use for the resource bundle
            warn!("Resource file not found: {}", settings.resource.display());
        }

        Ok(Box::new(EnergyEngine::new(
            settings.model_count(),
            settings.audio_gain,
            self.silence_floor,
        )))
    }
}

/// Reports silence for low-energy chunks and no detection otherwise
#[derive(Debug, Clone)]
pub struct EnergyEngine {
    hotwords: usize,
    audio_gain: f32,
    silence_floor: f32,
}

impl EnergyEngine {
    pub fn new(hotwords: usize, audio_gain: f32, silence_floor: f32) -> Self {
        debug!(
            "Energy engine: {} hotwords, gain={}, silence_floor={}",
            hotwords, audio_gain, silence_floor
        );

        Self {
            hotwords,
            audio_gain,
            silence_floor,
        }
    }

    /// Calculate normalized RMS energy of a chunk after gain
    fn calculate_energy(&self, samples: &[i16]) -> f32 {
        let sum_squares: f64 = samples
            .iter()
            .map(|&s| {
                let normalized = (s as f64 / i16::MAX as f64) * self.audio_gain as f64;
                normalized * normalized
            })
            .sum();

        let rms = (sum_squares / samples.len() as f64).sqrt();
        rms as f32
    }
}

impl RecognitionEngine for EnergyEngine {
    fn run_detection(&mut self, samples: &[i16]) -> i32 {
        if samples.is_empty() {
            return RESULT_NO_DETECTION;
        }

        let energy = self.calculate_energy(samples);
        trace!("Chunk analysis: samples={}, energy={:.4}", samples.len(), energy);

        if energy < self.silence_floor {
            RESULT_SILENCE
        } else {
            RESULT_NO_DETECTION
        }
    }

    fn sample_rate(&self) -> u32 {
        ENERGY_SAMPLE_RATE
    }

    fn num_channels(&self) -> u16 {
        1
    }

    fn bits_per_sample(&self) -> u16 {
        16
    }

    fn num_hotwords(&self) -> usize {
        self.hotwords
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn generate_tone(frequency: f32, duration_samples: usize, amplitude: f32) -> Vec<i16> {
        let sample_rate = ENERGY_SAMPLE_RATE as f32;
        (0..duration_samples)
            .map(|i| {
                let t = i as f32 / sample_rate;
                let sample = amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin();
                (sample * i16::MAX as f32) as i16
            })
            .collect()
    }

    fn settings(models: &str, audio_gain: f32) -> EngineSettings {
        EngineSettings {
            resource: PathBuf::from("resources/common.res"),
            models: models.to_string(),
            sensitivities: String::new(),
            audio_gain,
        }
    }

    #[test]
    fn test_silence_detection() {
        let mut engine = EnergyEngine::new(0, 1.0, DEFAULT_SILENCE_FLOOR);
        assert_eq!(engine.run_detection(&vec![0; 1024]), RESULT_SILENCE);
    }

    #[test]
    fn test_sound_is_not_silence() {
        let mut engine = EnergyEngine::new(0, 1.0, DEFAULT_SILENCE_FLOOR);
        let tone = generate_tone(440.0, 1024, 0.3);
        assert_eq!(engine.run_detection(&tone), RESULT_NO_DETECTION);
    }

    #[test]
    fn test_empty_chunk() {
        let mut engine = EnergyEngine::new(0, 1.0, DEFAULT_SILENCE_FLOOR);
        assert_eq!(engine.run_detection(&[]), RESULT_NO_DETECTION);
    }

    #[test]
    fn test_energy_calculation() {
        let engine = EnergyEngine::new(0, 1.0, DEFAULT_SILENCE_FLOOR);

        let energy_silence = engine.calculate_energy(&vec![0; 480]);
        assert!(energy_silence < 0.001);

        // RMS of a sine is amplitude / sqrt(2)
        let tone = generate_tone(200.0, 16000, 0.5);
        assert_relative_eq!(engine.calculate_energy(&tone), 0.5 / 2f32.sqrt(), epsilon = 0.01);
    }

    #[test]
    fn test_gain_lifts_quiet_audio_above_floor() {
        let quiet = generate_tone(300.0, 1024, 0.01);

        let mut unity = EnergyEngine::new(0, 1.0, DEFAULT_SILENCE_FLOOR);
        assert_eq!(unity.run_detection(&quiet), RESULT_SILENCE);

        let mut boosted = EnergyEngine::new(0, 10.0, DEFAULT_SILENCE_FLOOR);
        assert_eq!(boosted.run_detection(&quiet), RESULT_NO_DETECTION);
    }

    #[test]
    fn test_backend_reports_hotword_count_and_format() {
        let mut backend = EnergyBackend::default();
        let engine = backend.create(&settings("a.umdl,b.umdl", 1.0)).unwrap();

        assert_eq!(engine.num_hotwords(), 2);
        assert_eq!(engine.sample_rate(), 16000);
        assert_eq!(engine.num_channels(), 1);
        assert_eq!(engine.bits_per_sample(), 16);
    }

    #[test]
    fn test_backend_rejects_invalid_floor() {
        let mut backend = EnergyBackend::with_silence_floor(1.5);
        assert!(matches!(
            backend.create(&settings("", 1.0)),
            Err(DetectorError::EngineInit(_))
        ));
    }
}
