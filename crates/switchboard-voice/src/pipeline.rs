//! Recognize, generate, synthesize.
//!
//! One [`AudioPipeline::process`] call handles one unit of audio. Only
//! recognition failures abort it. A low-confidence or empty transcript ends
//! the run quietly, generation failures fall back to a canned reply and
//! synthesis or delivery failures are logged and leave the run without audio.

use crate::error::VoiceError;
use crate::llm::ReplyGenerator;
use crate::sink::AudioSink;
use crate::stt::SpeechRecognizer;
use crate::tts::SpeechSynthesizer;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Transcripts below this confidence are treated as noise.
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Reply used when generation fails.
pub const FALLBACK_REPLY: &str = "I'm sorry, I didn't catch that.";

/// Upper bounds for each external stage.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub recognize: Duration,
    pub generate: Duration,
    pub synthesize: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            recognize: Duration::from_secs(15),
            generate: Duration::from_secs(30),
            synthesize: Duration::from_secs(120),
        }
    }
}

/// What one pipeline run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub transcript: String,
    pub confidence: f32,
    /// `None` when the transcript was gated out.
    pub reply: Option<String>,
    pub audio_delivered: bool,
}

impl PipelineOutcome {
    pub fn gated(&self) -> bool {
        self.reply.is_none()
    }
}

#[derive(Clone, Default)]
pub struct AudioPipeline {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    generator: Option<Arc<dyn ReplyGenerator>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    timeouts: StageTimeouts,
}

impl std::fmt::Debug for AudioPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPipeline")
            .field("recognizer", &self.recognizer.is_some())
            .field("generator", &self.generator.is_some())
            .field("synthesizer", &self.synthesizer.is_some())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

async fn bounded<T, F>(limit: Duration, stage: &'static str, fut: F) -> Result<T, VoiceError>
where
    F: Future<Output = Result<T, VoiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(VoiceError::Timeout {
            stage,
            after: limit,
        }),
    }
}

impl AudioPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ReplyGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn has_recognizer(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Runs one unit of audio through the pipeline, delivering any synthesized
    /// reply to `sink`.
    pub async fn process(
        &self,
        session_id: &str,
        audio: &[u8],
        sink: &dyn AudioSink,
    ) -> Result<PipelineOutcome, VoiceError> {
        if audio.is_empty() {
            return Err(VoiceError::EmptyAudio);
        }
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or(VoiceError::PipelineNotConfigured("recognition"))?;

        let recognition = bounded(
            self.timeouts.recognize,
            "recognition",
            recognizer.recognize(audio),
        )
        .await
        .map_err(|e| match e {
            VoiceError::RecognitionFailed(_) | VoiceError::EmptyAudio => e,
            other => VoiceError::RecognitionFailed(other.to_string()),
        })?;

        let transcript = recognition.transcript.trim().to_string();
        if transcript.is_empty() || recognition.confidence < MIN_CONFIDENCE {
            tracing::debug!(
                session_id,
                confidence = recognition.confidence,
                "discarding low-confidence audio"
            );
            return Ok(PipelineOutcome {
                transcript,
                confidence: recognition.confidence,
                reply: None,
                audio_delivered: false,
            });
        }

        let reply = match &self.generator {
            Some(generator) => {
                match bounded(self.timeouts.generate, "generation", generator.generate(&transcript))
                    .await
                {
                    Ok(reply) if !reply.trim().is_empty() => reply,
                    Ok(_) => FALLBACK_REPLY.to_string(),
                    Err(e) => {
                        tracing::warn!(session_id, error = %e, "reply generation failed, using fallback");
                        FALLBACK_REPLY.to_string()
                    }
                }
            }
            None => format!("I heard you say: {}", transcript),
        };

        let audio_delivered = self.speak(session_id, &reply, sink).await;

        Ok(PipelineOutcome {
            transcript,
            confidence: recognition.confidence,
            reply: Some(reply),
            audio_delivered,
        })
    }

    async fn speak(&self, session_id: &str, reply: &str, sink: &dyn AudioSink) -> bool {
        let Some(synthesizer) = &self.synthesizer else {
            tracing::debug!(session_id, "no synthesizer configured, skipping audio");
            return false;
        };

        let audio = match bounded(
            self.timeouts.synthesize,
            "synthesis",
            synthesizer.synthesize(reply),
        )
        .await
        {
            Ok(audio) if !audio.is_empty() => audio,
            Ok(_) => {
                tracing::warn!(session_id, "synthesizer returned no audio");
                return false;
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "speech synthesis failed");
                return false;
            }
        };

        match sink.deliver(session_id, audio).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to deliver reply audio");
                false
            }
        }
    }
}
