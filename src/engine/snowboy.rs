/// Native detector binding
///
/// Links against the C wrapper of the snowboy detector library
/// (`libsnowboy-detect-c-wrapper`). The library must be on the linker path
/// when the `snowboy` feature is enabled.

use super::{EngineBackend, EngineSettings, RecognitionEngine, RESULT_ERROR};
use crate::error::DetectorError;
use std::ffi::{c_char, c_float, c_int, CString};
use tracing::{debug, info};

#[repr(C)]
struct RawDetector {
    _private: [u8; 0],
}

#[link(name = "snowboy-detect-c-wrapper")]
extern "C" {
    fn SnowboyDetectConstructor(
        resource_filename: *const c_char,
        model_str: *const c_char,
    ) -> *mut RawDetector;
    fn SnowboyDetectRunDetection(
        detector: *mut RawDetector,
        data: *const i16,
        array_length: c_int,
        is_end: bool,
    ) -> c_int;
    fn SnowboyDetectSetSensitivity(detector: *mut RawDetector, sensitivity_str: *const c_char);
    fn SnowboyDetectSetAudioGain(detector: *mut RawDetector, audio_gain: c_float);
    fn SnowboyDetectNumHotwords(detector: *mut RawDetector) -> c_int;
    fn SnowboyDetectSampleRate(detector: *mut RawDetector) -> c_int;
    fn SnowboyDetectNumChannels(detector: *mut RawDetector) -> c_int;
    fn SnowboyDetectBitsPerSample(detector: *mut RawDetector) -> c_int;
    fn SnowboyDetectDestructor(detector: *mut RawDetector);
}

/// Constructs [`SnowboyEngine`] instances
#[derive(Debug, Clone, Default)]
pub struct SnowboyBackend;

impl EngineBackend for SnowboyBackend {
    fn create(
        &mut self,
        settings: &EngineSettings,
    ) -> Result<Box<dyn RecognitionEngine>, DetectorError> {
        Ok(Box::new(SnowboyEngine::new(settings)?))
    }
}

fn c_string(value: &str, what: &str) -> Result<CString, DetectorError> {
    CString::new(value)
        .map_err(|_| DetectorError::EngineInit(format!("{} contains a NUL byte", what)))
}

/// Owned native detector instance, destroyed on drop
pub struct SnowboyEngine {
    raw: *mut RawDetector,
}

// The raw detector is exclusively owned and only touched through &mut self
// or &self from a single thread at a time.
unsafe impl Send for SnowboyEngine {}

impl SnowboyEngine {
    pub fn new(settings: &EngineSettings) -> Result<Self, DetectorError> {
        let resource = settings.resource.to_str().ok_or_else(|| {
            DetectorError::EngineInit("resource path is not valid UTF-8".to_string())
        })?;

        if !settings.resource.exists() {
            return Err(DetectorError::EngineInit(format!(
                "resource file not found: {}",
                resource
            )));
        }

        let resource = c_string(resource, "resource path")?;
        let models = c_string(&settings.models, "model list")?;
        let sensitivities = c_string(&settings.sensitivities, "sensitivity list")?;

        // SAFETY: both pointers are valid NUL-terminated strings for the call
        let raw = unsafe { SnowboyDetectConstructor(resource.as_ptr(), models.as_ptr()) };
        if raw.is_null() {
            return Err(DetectorError::EngineInit(
                "native detector constructor returned null".to_string(),
            ));
        }

        // SAFETY: raw is a live detector returned by the constructor above
        unsafe {
            SnowboyDetectSetSensitivity(raw, sensitivities.as_ptr());
            SnowboyDetectSetAudioGain(raw, settings.audio_gain);
        }

        info!("Native detector constructed");
        Ok(Self { raw })
    }
}

impl RecognitionEngine for SnowboyEngine {
    fn run_detection(&mut self, samples: &[i16]) -> i32 {
        let Ok(len) = c_int::try_from(samples.len()) else {
            return RESULT_ERROR;
        };

        // SAFETY: samples outlives the call and len matches its length
        unsafe { SnowboyDetectRunDetection(self.raw, samples.as_ptr(), len, false) }
    }

    fn sample_rate(&self) -> u32 {
        // SAFETY: self.raw is live until drop
        unsafe { SnowboyDetectSampleRate(self.raw) }.max(0) as u32
    }

    fn num_channels(&self) -> u16 {
        // SAFETY: self.raw is live until drop
        unsafe { SnowboyDetectNumChannels(self.raw) }.max(0) as u16
    }

    fn bits_per_sample(&self) -> u16 {
        // SAFETY: self.raw is live until drop
        unsafe { SnowboyDetectBitsPerSample(self.raw) }.max(0) as u16
    }

    fn num_hotwords(&self) -> usize {
        // SAFETY: self.raw is live until drop
        unsafe { SnowboyDetectNumHotwords(self.raw) }.max(0) as usize
    }
}

impl Drop for SnowboyEngine {
    fn drop(&mut self) {
        debug!("Destroying native detector");
        // SAFETY: self.raw came from the constructor and is destroyed exactly once
        unsafe { SnowboyDetectDestructor(self.raw) }
    }
}
