//! Voice infrastructure for Switchboard.
//!
//! Issues signaling access tokens, runs the speech pipeline
//! (recognition, reply generation, synthesis) over buffered audio windows
//! and owns the per-participant [`MediaSession`] state machine that
//! connects an AI agent to a room.
//!
//! Vendors sit behind the [`SpeechRecognizer`], [`ReplyGenerator`],
//! [`SpeechSynthesizer`] and [`MediaTransport`] traits and are selected by
//! name through the [`factory`] module.

pub mod config;
pub mod error;
pub mod factory;
pub mod llm;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod sink;
pub mod stt;
pub mod transport;
pub mod tts;
pub mod window;

pub use config::{LiveKitConfig, LlmConfig, PipelineConfig, SttConfig, TtsConfig};
pub use error::VoiceError;
pub use llm::{OllamaGenerator, ReplyGenerator};
pub use pipeline::{AudioPipeline, PipelineOutcome, StageTimeouts, FALLBACK_REPLY, MIN_CONFIDENCE};
pub use service::VoiceService;
pub use session::{Cleanup, MediaSession, MediaSessionSettings, RunExit, SessionState};
pub use sink::{AudioSink, FileSink};
pub use stt::{Recognition, SpeechRecognizer, WhisperCliRecognizer, WhisperHttpRecognizer};
pub use transport::{
    InMemoryTransport, LiveKitTransport, LinkControl, MediaLink, MediaTransport, RoomFeed,
    RoomTarget,
};
pub use tts::{PiperCliSynthesizer, PiperHttpSynthesizer, SpeechSynthesizer};
pub use window::{AudioWindow, DEFAULT_WINDOW};
