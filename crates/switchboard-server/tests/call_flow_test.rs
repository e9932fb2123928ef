mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{participant_event, server, server_with, Options};
use switchboard_calls::{get_call, get_session, list_call_sessions};
use switchboard_types::{CallStatus, SessionRole, SessionStatus};
use switchboard_voice::AudioPipeline;

#[tokio::test]
async fn create_call_issues_caller_token() {
    let s = server();
    let (status, json) = s
        .post_json("/calls", r#"{"caller_id":"external-caller"}"#)
        .await;

    assert_eq!(status, StatusCode::OK);
    let call_id = json["call_id"].as_str().unwrap();
    let session_id = json["session_id"].as_str().unwrap();
    let token = json["token"].as_str().unwrap();
    assert!(!call_id.is_empty());
    assert!(!session_id.is_empty());
    assert!(!token.is_empty());
    assert_eq!(json["url"], "http://localhost:7880");

    let conn = s.pool.get().unwrap();
    let session = get_session(&conn, session_id).unwrap();
    assert_eq!(session.role, SessionRole::Caller);
    assert_eq!(session.status, SessionStatus::New);
    assert_eq!(session.user_id, "external-caller");
    assert_eq!(session.token.as_deref(), Some(token));
    assert_eq!(get_call(&conn, call_id).unwrap().status, CallStatus::New);
}

#[tokio::test]
async fn caller_join_spawns_one_agent() {
    let s = server();
    let (call_id, caller) = s.create_call().await;

    let (status, body) = s
        .webhook(&participant_event("participant_joined", &caller, &call_id))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let conn = s.pool.get().unwrap();
    assert_eq!(get_session(&conn, &caller).unwrap().status, SessionStatus::Active);
    assert_eq!(get_call(&conn, &call_id).unwrap().status, CallStatus::Active);

    let agents: Vec<_> = list_call_sessions(&conn, &call_id)
        .unwrap()
        .into_iter()
        .filter(|session| session.role == SessionRole::Agent)
        .collect();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].status, SessionStatus::Active);
    assert!(agents[0].token.as_deref().is_some_and(|t| !t.is_empty()));
    assert!(s.agents.registry().contains(&call_id));

    s.agents.shutdown().await;
}

#[tokio::test]
async fn uploaded_audio_returns_transcript() {
    let s = server();
    let (call_id, caller) = s.create_call().await;
    s.webhook(&participant_event("participant_joined", &caller, &call_id))
        .await;
    let agent_session = s.agents.registry().lookup(&call_id).unwrap().session_id;

    let (status, json) = s
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/sessions/{}/audio", agent_session))
                .body(Body::from(b"RIFF recorded speech".to_vec()))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({"transcript": "hello world"}));

    let artifacts: Vec<_> = std::fs::read_dir(s.dir.path().join("artifacts"))
        .unwrap()
        .collect();
    assert_eq!(artifacts.len(), 1);

    s.agents.shutdown().await;
}

#[tokio::test]
async fn caller_leave_stops_agent_and_ends_everything() {
    let s = server();
    let (call_id, caller) = s.create_call().await;
    s.webhook(&participant_event("participant_joined", &caller, &call_id))
        .await;
    let agent_session = s.agents.registry().lookup(&call_id).unwrap().session_id;

    let (status, _) = s
        .webhook(&participant_event("participant_left", &caller, &call_id))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(s.agents.registry().lookup(&call_id).is_err());
    let conn = s.pool.get().unwrap();
    assert_eq!(get_session(&conn, &caller).unwrap().status, SessionStatus::Ended);
    assert_eq!(
        get_session(&conn, &agent_session).unwrap().status,
        SessionStatus::Ended
    );
    assert_eq!(get_call(&conn, &call_id).unwrap().status, CallStatus::Ended);
}

#[tokio::test]
async fn omitted_caller_id_is_generated() {
    let s = server();
    for body in ["", "{}"] {
        let (status, json) = s.post_json("/calls", body).await;
        assert_eq!(status, StatusCode::OK);
        let session_id = json["session_id"].as_str().unwrap();
        let session = get_session(&s.pool.get().unwrap(), session_id).unwrap();
        assert!(session.user_id.starts_with("user-"));
    }
}

#[tokio::test]
async fn invalid_caller_ids_are_rejected() {
    let s = server();
    let too_long = format!(r#"{{"caller_id":"{}"}}"#, "x".repeat(129));
    for body in [r#"{"caller_id":"   "}"#, too_long.as_str(), "not json"] {
        let (status, json) = s.post_json("/calls", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn create_call_without_credentials_is_unavailable() {
    let s = server_with(Options {
        api_secret: "",
        ..Default::default()
    });
    let (status, _) = s.post_json("/calls", "{}").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn call_and_session_records_are_readable() {
    let s = server();
    let (call_id, caller) = s.create_call().await;

    let (status, json) = s.get(&format!("/calls/{}", call_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], call_id.as_str());
    assert_eq!(json["status"], "new");
    assert_eq!(json["sessions"].as_array().unwrap().len(), 1);
    assert!(json["sessions"][0].get("token").is_none());

    let (status, json) = s.get(&format!("/sessions/{}", caller)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["role"], "caller");
    assert!(json.get("token").is_none());

    let (status, _) = s.get("/calls/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = s.get("/sessions/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn audio_endpoint_error_statuses() {
    let s = server();
    let (_, caller) = s.create_call().await;

    let (status, _) = s
        .send(
            Request::builder()
                .method("POST")
                .uri("/sessions/missing/audio")
                .body(Body::from("audio"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = s
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/sessions/{}/audio", caller))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bare = server_with(Options {
        pipeline: AudioPipeline::new(),
        ..Default::default()
    });
    let (_, caller) = bare.create_call().await;
    let (status, _) = bare
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/sessions/{}/audio", caller))
                .body(Body::from("audio"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_reports_version() {
    let s = server();
    let (status, json) = s.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
