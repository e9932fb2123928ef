use std::sync::Arc;
use std::time::Duration;
use switchboard_agents::{AgentManager, AgentSettings, SignalingEvent, SignalingEventRouter};
use switchboard_calls::{create_call, get_call, get_session, list_call_sessions, new_id, NewCall};
use switchboard_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use switchboard_types::{CallStatus, SessionRole, SessionStatus};
use switchboard_voice::{AudioPipeline, InMemoryTransport, LiveKitConfig, VoiceService};

struct Fixture {
    _dir: tempfile::TempDir,
    pool: DbPool,
    agents: Arc<AgentManager>,
    router: SignalingEventRouter,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(
        dir.path().join("router.db").to_str().unwrap(),
        DbRuntimeSettings::default(),
    )
    .unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();

    let agents = Arc::new(AgentManager::new(
        pool.clone(),
        VoiceService::new(LiveKitConfig::new("http://localhost:7880", "devkey", "secret")),
        Arc::new(AudioPipeline::new()),
        Arc::new(InMemoryTransport::new()),
        AgentSettings {
            artifacts_dir: dir.path().join("artifacts"),
            stop_timeout: Duration::from_secs(1),
            ..Default::default()
        },
    ));
    let router = SignalingEventRouter::new(pool.clone(), agents.clone());
    Fixture {
        _dir: dir,
        pool,
        agents,
        router,
    }
}

fn seed_call(pool: &DbPool) -> (String, String) {
    let call_id = new_id();
    let caller_session = new_id();
    create_call(
        &pool.get().unwrap(),
        &NewCall {
            call_id: call_id.clone(),
            caller_id: "external-caller".to_string(),
            caller_session_id: caller_session.clone(),
            caller_token: Some("caller-token".to_string()),
        },
    )
    .unwrap();
    (call_id, caller_session)
}

fn joined(identity: &str) -> SignalingEvent {
    SignalingEvent::ParticipantJoined {
        identity: identity.to_string(),
    }
}

fn left(identity: &str) -> SignalingEvent {
    SignalingEvent::ParticipantLeft {
        identity: identity.to_string(),
    }
}

#[tokio::test]
async fn caller_join_activates_call_and_spawns_agent() {
    let f = fixture();
    let (call_id, caller) = seed_call(&f.pool);

    f.router.dispatch(joined(&caller)).await.unwrap();

    let conn = f.pool.get().unwrap();
    assert_eq!(get_session(&conn, &caller).unwrap().status, SessionStatus::Active);
    assert_eq!(get_call(&conn, &call_id).unwrap().status, CallStatus::Active);

    let agents: Vec<_> = list_call_sessions(&conn, &call_id)
        .unwrap()
        .into_iter()
        .filter(|s| s.role == SessionRole::Agent)
        .collect();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].status, SessionStatus::Active);
    assert!(agents[0].token.as_deref().is_some_and(|t| !t.is_empty()));
    assert!(f.agents.registry().contains(&call_id));
}

#[tokio::test]
async fn duplicate_caller_join_keeps_one_agent() {
    let f = fixture();
    let (call_id, caller) = seed_call(&f.pool);

    f.router.dispatch(joined(&caller)).await.unwrap();
    let first = f.agents.registry().lookup(&call_id).unwrap().session_id;
    f.router.dispatch(joined(&caller)).await.unwrap();

    assert_eq!(f.agents.registry().lookup(&call_id).unwrap().session_id, first);
    let agent_rows = list_call_sessions(&f.pool.get().unwrap(), &call_id)
        .unwrap()
        .into_iter()
        .filter(|s| s.role == SessionRole::Agent)
        .count();
    assert_eq!(agent_rows, 1);
}

#[tokio::test]
async fn agent_join_does_not_spawn() {
    let f = fixture();
    let (call_id, caller) = seed_call(&f.pool);
    f.router.dispatch(joined(&caller)).await.unwrap();
    let agent_session = f.agents.registry().lookup(&call_id).unwrap().session_id;

    f.router.dispatch(joined(&agent_session)).await.unwrap();

    assert_eq!(
        f.agents.registry().lookup(&call_id).unwrap().session_id,
        agent_session
    );
}

#[tokio::test]
async fn caller_leave_stops_agent_and_ends_call() {
    let f = fixture();
    let (call_id, caller) = seed_call(&f.pool);
    f.router.dispatch(joined(&caller)).await.unwrap();
    let agent_session = f.agents.registry().lookup(&call_id).unwrap().session_id;

    f.router.dispatch(left(&caller)).await.unwrap();

    assert!(f.agents.registry().lookup(&call_id).is_err());
    let conn = f.pool.get().unwrap();
    assert_eq!(get_session(&conn, &caller).unwrap().status, SessionStatus::Ended);
    assert_eq!(
        get_session(&conn, &agent_session).unwrap().status,
        SessionStatus::Ended
    );
    assert_eq!(get_call(&conn, &call_id).unwrap().status, CallStatus::Ended);
}

#[tokio::test]
async fn room_end_tolerates_missing_agent() {
    let f = fixture();
    let (call_id, _) = seed_call(&f.pool);

    f.router
        .dispatch(SignalingEvent::RoomEnded {
            room: call_id.clone(),
        })
        .await
        .unwrap();

    assert_eq!(
        get_call(&f.pool.get().unwrap(), &call_id).unwrap().status,
        CallStatus::Ended
    );
}

#[tokio::test]
async fn room_end_stops_running_agent() {
    let f = fixture();
    let (call_id, caller) = seed_call(&f.pool);
    f.router.dispatch(joined(&caller)).await.unwrap();

    f.router
        .dispatch(SignalingEvent::RoomEnded {
            room: call_id.clone(),
        })
        .await
        .unwrap();

    assert!(!f.agents.registry().contains(&call_id));
    assert_eq!(
        get_call(&f.pool.get().unwrap(), &call_id).unwrap().status,
        CallStatus::Ended
    );
}

#[tokio::test]
async fn unknown_participants_and_kinds_are_ignored() {
    let f = fixture();
    f.router.dispatch(joined("nobody")).await.unwrap();
    f.router.dispatch(left("nobody")).await.unwrap();
    f.router
        .dispatch(SignalingEvent::RoomEnded {
            room: "no-such-call".to_string(),
        })
        .await
        .unwrap();
    f.router
        .dispatch(SignalingEvent::Ignored {
            kind: "track_published".to_string(),
        })
        .await
        .unwrap();
    assert!(f.agents.registry().is_empty());
}
