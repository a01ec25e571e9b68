/// Hotword detection service binary
///
/// Streams a WAV file, raw PCM on stdin, or the microphone through the
/// detector and prints one JSON line per detection.

use clap::Parser;
use hotword_detector::{
    ChannelHandler, DetectorError, DetectorSession, DetectorSettings, HotwordEvent,
    HotwordSettings, WavSource,
};
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[cfg(feature = "microphone")]
type Capture = cpal::Stream;
#[cfg(not(feature = "microphone"))]
type Capture = ();

#[derive(Parser)]
#[command(name = "hotword-service")]
#[command(about = "Hotword and silence detection over streaming audio", long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine resource bundle
    #[arg(long)]
    resource: Option<PathBuf>,

    /// Hotword model, optionally with a sensitivity: `alexa.umdl:0.6`
    #[arg(long = "model", value_parser = parse_model)]
    models: Vec<HotwordSettings>,

    /// Fire the silence handler after this many milliseconds of silence
    #[arg(long)]
    silence_ms: Option<u64>,

    /// Audio gain applied by the engine
    #[arg(long)]
    gain: Option<f32>,

    /// WAV file to read, or `-` for raw 16-bit little-endian PCM on stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// Capture from the default microphone instead of --input
    #[cfg(feature = "microphone")]
    #[arg(long)]
    mic: bool,
}

fn parse_model(arg: &str) -> Result<HotwordSettings, String> {
    let (model, sensitivity) = match arg.rsplit_once(':') {
        Some((model, sens)) => match sens.parse::<f32>() {
            Ok(s) => (model, Some(s)),
            Err(_) => (arg, None),
        },
        None => (arg, None),
    };

    if model.is_empty() {
        return Err("model path is empty".to_string());
    }

    Ok(HotwordSettings {
        model: model.to_string(),
        sensitivity,
        name: None,
    })
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hotword_detector=info,hotword_service=info".into()),
        )
        .init();

    info!("Starting hotword detection service v{}", hotword_detector::VERSION);

    let cli = Cli::parse();

    // Load configuration
    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    let (handler, mut events) = ChannelHandler::channel();

    let mut session = match settings
        .into_builder(|| handler.clone())
        .and_then(|builder| builder.start_with(settings.backend()))
    {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create detector: {}", e);
            std::process::exit(exit_code(&e));
        }
    };
    // Only the session's handlers may keep the event channel open
    drop(handler);

    let (source, mut capture) = match open_source(&cli, &mut session) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open audio source: {}", e);
            std::process::exit(1);
        }
    };

    let detection = tokio::task::spawn_blocking(move || run_session(session, source));

    info!("Listening for {} hotword(s)", settings.hotwords.len());

    // Event loop
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => emit(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if capture.is_some() => {
                info!("Interrupted, stopping capture");
                // Dropping the capture closes the source; the session drains and exits
                capture = None;
            }
        }
    }

    match detection.await {
        Ok(Ok(())) => info!("Audio stream finished"),
        Ok(Err(e)) => {
            error!("Detection stopped: {}", e);
            std::process::exit(exit_code(&e));
        }
        Err(e) => {
            error!("Detection task panicked: {}", e);
            std::process::exit(1);
        }
    }

    info!("Hotword detection service stopped");
}

/// Load settings from file or defaults, then environment, then CLI flags
fn load_settings(cli: &Cli) -> anyhow::Result<DetectorSettings> {
    let mut settings = match &cli.config {
        Some(path) => DetectorSettings::from_file(path)?,
        None => DetectorSettings::default(),
    };

    settings.apply_env()?;

    if let Some(resource) = &cli.resource {
        settings.resource = resource.clone();
    }
    if !cli.models.is_empty() {
        settings.hotwords = cli.models.clone();
    }
    if let Some(ms) = cli.silence_ms {
        settings.silence_threshold_ms = Some(ms);
    }
    if let Some(gain) = cli.gain {
        settings.audio_gain = gain;
    }

    settings.validate()?;
    Ok(settings)
}

fn open_source(
    cli: &Cli,
    session: &mut DetectorSession,
) -> anyhow::Result<(Box<dyn Read + Send>, Option<Capture>)> {
    if let Some(opened) = open_microphone(cli, session)? {
        return Ok(opened);
    }

    if cli.input == "-" {
        info!("Reading raw PCM from stdin");
        return Ok((Box::new(std::io::stdin()), None));
    }

    let source = WavSource::open(&cli.input)?;
    source.check_format(session.audio_format()?)?;
    Ok((Box::new(source), None))
}

#[cfg(feature = "microphone")]
fn open_microphone(
    cli: &Cli,
    session: &mut DetectorSession,
) -> anyhow::Result<Option<(Box<dyn Read + Send>, Option<Capture>)>> {
    if !cli.mic {
        return Ok(None);
    }

    let format = session.audio_format()?;
    let (producer, source) = hotword_detector::PcmRingBuffer::new(format)?;
    let stream = hotword_detector::capture::start_default_input(format, producer)?;
    Ok(Some((Box::new(source), Some(stream))))
}

#[cfg(not(feature = "microphone"))]
fn open_microphone(
    _cli: &Cli,
    _session: &mut DetectorSession,
) -> anyhow::Result<Option<(Box<dyn Read + Send>, Option<Capture>)>> {
    Ok(None)
}

/// Run the blocking detection loop; handlers are dropped when this returns
fn run_session(
    mut session: DetectorSession,
    source: Box<dyn Read + Send>,
) -> Result<(), DetectorError> {
    let result = session.read_and_detect(source);

    let stats = session.stats().clone();
    info!(
        "Processed {} chunks ({} bytes), {} hotwords, {} silence events",
        stats.chunks_processed, stats.bytes_consumed, stats.keywords_detected, stats.silence_events
    );

    if session.is_initialized() {
        if let Err(e) = session.close() {
            warn!("Error closing detector: {}", e);
        }
    }

    result
}

/// Exit status: 2 for misconfiguration, 1 for runtime failures
fn exit_code(err: &DetectorError) -> i32 {
    if err.is_configuration() {
        2
    } else {
        1
    }
}

fn emit(event: &HotwordEvent) {
    info!("Detected '{}'", event.keyword);
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to serialize event: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_with_sensitivity() {
        let parsed = parse_model("models/alexa.umdl:0.6").unwrap();
        assert_eq!(parsed.model, "models/alexa.umdl");
        assert_eq!(parsed.sensitivity, Some(0.6));
    }

    #[test]
    fn test_parse_model_without_sensitivity() {
        let parsed = parse_model("C:\\models\\alexa.umdl").unwrap();
        assert_eq!(parsed.model, "C:\\models\\alexa.umdl");
        assert_eq!(parsed.sensitivity, None);
        assert!(parse_model("").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "hotword-service",
            "--model",
            "alexa.umdl",
            "--model",
            "jarvis.pmdl:0.4",
            "--silence-ms",
            "1500",
            "--input",
            "audio.wav",
        ])
        .unwrap();

        assert_eq!(cli.models.len(), 2);
        assert_eq!(cli.silence_ms, Some(1500));
        assert_eq!(cli.input, "audio.wav");
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&DetectorError::UnboundResult { code: -2 }), 2);
        assert_eq!(exit_code(&DetectorError::Config("bad".to_string())), 2);
        assert_eq!(exit_code(&DetectorError::EngineFailure), 1);
    }
}
