//! Builds pipeline capabilities and transports from vendor names.

use crate::config::{
    LlmConfig, PipelineConfig, SttConfig, TtsConfig, DEFAULT_OLLAMA_ENDPOINT,
    DEFAULT_OLLAMA_MODEL, DEFAULT_PIPER_ENDPOINT, DEFAULT_WHISPER_ENDPOINT,
};
use crate::error::VoiceError;
use crate::llm::{OllamaGenerator, ReplyGenerator};
use crate::pipeline::{AudioPipeline, StageTimeouts};
use crate::stt::{SpeechRecognizer, WhisperCliRecognizer, WhisperHttpRecognizer};
use crate::transport::{InMemoryTransport, LiveKitTransport, MediaTransport};
use crate::tts::{PiperCliSynthesizer, PiperHttpSynthesizer, SpeechSynthesizer};
use std::sync::Arc;
use std::time::Duration;

/// Vendor name that leaves a capability unconfigured.
pub const VENDOR_NONE: &str = "none";

fn normalize(vendor: &str) -> String {
    vendor.trim().to_ascii_lowercase()
}

fn required<'a>(value: &'a Option<String>, what: &str, vendor: &str) -> Result<&'a str, VoiceError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| VoiceError::Config(format!("{} requires {}", vendor, what)))
}

fn endpoint_or<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().filter(|v| !v.is_empty()).unwrap_or(default)
}

pub fn build_recognizer(
    config: &SttConfig,
) -> Result<Option<Arc<dyn SpeechRecognizer>>, VoiceError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match normalize(&config.vendor).as_str() {
        VENDOR_NONE => Ok(None),
        "whisper" => Ok(Some(Arc::new(WhisperHttpRecognizer::new(
            endpoint_or(&config.endpoint, DEFAULT_WHISPER_ENDPOINT),
            timeout,
        )?))),
        "whisper-cli" => Ok(Some(Arc::new(WhisperCliRecognizer::new(
            required(&config.model_path, "model_path", "whisper-cli")?,
            config.binary_path.as_deref().unwrap_or("whisper-cli"),
            timeout,
        )))),
        other => Err(VoiceError::UnknownVendor {
            capability: "stt",
            vendor: other.to_string(),
        }),
    }
}

pub fn build_generator(config: &LlmConfig) -> Result<Option<Arc<dyn ReplyGenerator>>, VoiceError> {
    match normalize(&config.vendor).as_str() {
        VENDOR_NONE => Ok(None),
        "ollama" => Ok(Some(Arc::new(OllamaGenerator::new(
            endpoint_or(&config.endpoint, DEFAULT_OLLAMA_ENDPOINT),
            endpoint_or(&config.model, DEFAULT_OLLAMA_MODEL),
            Duration::from_secs(config.timeout_secs),
        )?))),
        other => Err(VoiceError::UnknownVendor {
            capability: "llm",
            vendor: other.to_string(),
        }),
    }
}

pub fn build_synthesizer(
    config: &TtsConfig,
) -> Result<Option<Arc<dyn SpeechSynthesizer>>, VoiceError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match normalize(&config.vendor).as_str() {
        VENDOR_NONE => Ok(None),
        "piper" => Ok(Some(Arc::new(PiperHttpSynthesizer::new(
            endpoint_or(&config.endpoint, DEFAULT_PIPER_ENDPOINT),
            timeout,
        )?))),
        "piper-cli" => Ok(Some(Arc::new(PiperCliSynthesizer::new(
            required(&config.model_path, "model_path", "piper-cli")?,
            config.binary_path.as_deref().unwrap_or("piper"),
            config.speed,
            timeout,
        )?))),
        other => Err(VoiceError::UnknownVendor {
            capability: "tts",
            vendor: other.to_string(),
        }),
    }
}

/// Assembles an [`AudioPipeline`] from configuration.
pub fn build_pipeline(config: &PipelineConfig) -> Result<AudioPipeline, VoiceError> {
    let mut pipeline = AudioPipeline::new().with_timeouts(StageTimeouts {
        recognize: Duration::from_secs(config.stt.timeout_secs),
        generate: Duration::from_secs(config.llm.timeout_secs),
        synthesize: Duration::from_secs(config.tts.timeout_secs),
    });
    if let Some(recognizer) = build_recognizer(&config.stt)? {
        pipeline = pipeline.with_recognizer(recognizer);
    }
    if let Some(generator) = build_generator(&config.llm)? {
        pipeline = pipeline.with_generator(generator);
    }
    if let Some(synthesizer) = build_synthesizer(&config.tts)? {
        pipeline = pipeline.with_synthesizer(synthesizer);
    }
    tracing::info!(
        stt = %config.stt.vendor,
        llm = %config.llm.vendor,
        tts = %config.tts.vendor,
        "audio pipeline configured"
    );
    Ok(pipeline)
}

/// Media transport by vendor name: `livekit` or `memory`.
pub fn build_transport(vendor: &str) -> Result<Arc<dyn MediaTransport>, VoiceError> {
    match normalize(vendor).as_str() {
        "livekit" => Ok(Arc::new(LiveKitTransport::new())),
        "memory" => Ok(Arc::new(InMemoryTransport::new())),
        other => Err(VoiceError::UnknownVendor {
            capability: "webrtc",
            vendor: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_disables_capabilities() {
        let config = PipelineConfig {
            stt: SttConfig {
                vendor: "none".to_string(),
                ..Default::default()
            },
            llm: LlmConfig {
                vendor: "NONE".to_string(),
                ..Default::default()
            },
            tts: TtsConfig {
                vendor: " none ".to_string(),
                ..Default::default()
            },
        };
        let pipeline = build_pipeline(&config).unwrap();
        assert!(!pipeline.has_recognizer());
    }

    #[test]
    fn defaults_build_http_vendors() {
        let pipeline = build_pipeline(&PipelineConfig::default()).unwrap();
        assert!(pipeline.has_recognizer());
    }

    #[test]
    fn unknown_vendor_is_rejected() {
        let config = SttConfig {
            vendor: "deepgram".to_string(),
            ..Default::default()
        };
        match build_recognizer(&config) {
            Err(VoiceError::UnknownVendor { capability, vendor }) => {
                assert_eq!(capability, "stt");
                assert_eq!(vendor, "deepgram");
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.is_some())),
        }
        assert!(build_transport("carrier-pigeon").is_err());
    }

    #[test]
    fn cli_vendors_need_a_model() {
        let config = TtsConfig {
            vendor: "piper-cli".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            build_synthesizer(&config),
            Err(VoiceError::Config(_))
        ));
    }

    #[test]
    fn known_transports_build() {
        assert!(build_transport("livekit").is_ok());
        assert!(build_transport("Memory").is_ok());
    }
}
