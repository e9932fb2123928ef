use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use switchboard_voice::{LiveKitConfig, VoiceError, VoiceService};

const URL: &str = "http://localhost:7880";
const KEY: &str = "devkey";
const SECRET: &str = "secret";

#[derive(Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    video: VideoClaims,
}

#[derive(Deserialize)]
struct VideoClaims {
    room: String,
    #[serde(rename = "roomJoin")]
    room_join: bool,
    #[serde(rename = "canPublish")]
    can_publish: bool,
    #[serde(rename = "canSubscribe")]
    can_subscribe: bool,
}

fn decode_claims(token: &str) -> Claims {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(SECRET.as_bytes());
    decode::<Claims>(token, &key, &validation)
        .expect("Failed to decode token")
        .claims
}

#[test]
fn join_token_is_scoped_to_room_and_identity() {
    let service = VoiceService::new(LiveKitConfig::new(URL, KEY, SECRET));
    let token = service
        .generate_join_token("call-42", "session-7", "session-7")
        .expect("Failed to generate token");

    let claims = decode_claims(&token);
    assert_eq!(claims.sub, "session-7");
    assert_eq!(claims.iss, KEY);
    assert_eq!(claims.video.room, "call-42");
    assert!(claims.video.room_join, "roomJoin should be true");
    assert!(claims.video.can_publish, "canPublish should be true");
    assert!(claims.video.can_subscribe, "canSubscribe should be true");
}

#[test]
fn agent_token_requires_signaling_url() {
    let service = VoiceService::new(LiveKitConfig::new("", KEY, SECRET));
    assert!(!service.is_enabled());
    assert!(matches!(
        service.issue_agent_token("call-1", "agent"),
        Err(VoiceError::TokenIssuance(_))
    ));

    let service = VoiceService::new(LiveKitConfig::new(URL, KEY, SECRET));
    let token = service.issue_agent_token("call-1", "agent").unwrap();
    assert_eq!(decode_claims(&token).sub, "agent");
}

#[test]
fn missing_credentials_fail_issuance() {
    let service = VoiceService::new(LiveKitConfig::new(URL, "", ""));
    assert!(matches!(
        service.generate_join_token("r", "i", "n"),
        Err(VoiceError::TokenIssuance(_))
    ));
}

#[test]
fn secret_never_leaks_through_debug_or_serialize() {
    let config = LiveKitConfig::new(URL, KEY, "super-secret-value");
    let debug = format!("{:?}", config);
    assert!(!debug.contains("super-secret-value"));
    assert!(debug.contains("[REDACTED]"));

    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("super-secret-value"));
}

#[test]
fn pipeline_config_parses_from_toml() {
    let config: switchboard_voice::PipelineConfig = toml::from_str(
        r#"
        [stt]
        vendor = "whisper-cli"
        model_path = "/models/ggml-base.en.bin"

        [llm]
        vendor = "none"
        "#,
    )
    .unwrap();
    assert_eq!(config.stt.vendor, "whisper-cli");
    assert_eq!(config.stt.timeout_secs, 15);
    assert_eq!(config.llm.vendor, "none");
    assert_eq!(config.tts.vendor, "piper");
    assert_eq!(config.tts.timeout_secs, 120);
}
