use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use retro_live_back::{
    config::AppConfig,
    dao::{
        models::{SessionStatus, SessionTemplate},
        retro_store::MemoryRetroStore,
    },
    dto::{
        retro::{AddItemRequest, CreateGroupRequest, CreateRetrospectiveRequest},
        ws::{Envelope, EventKind},
    },
    error::ServiceError,
    services::{auth_service::JwtVerifier, session_service},
    state::{
        AppState, SharedState,
        hub::{ClientHandle, Frame},
    },
};

async fn state() -> SharedState {
    let state = AppState::new(
        AppConfig::default(),
        Arc::new(JwtVerifier::new(b"integration-secret")),
    );
    state.install_store(Arc::new(MemoryRetroStore::new())).await;
    state
}

fn connect(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    capacity: usize,
) -> (Uuid, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(capacity);
    let id = Uuid::new_v4();
    state.hub().register(ClientHandle {
        id,
        session_id,
        user_id,
        name: format!("user-{user_id}"),
        tx,
    });
    (id, rx)
}

fn kinds(rx: &mut mpsc::Receiver<Frame>) -> Vec<EventKind> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|frame| Envelope::from_json_str(&frame).unwrap().kind)
        .collect()
}

#[tokio::test]
async fn retrospective_from_planning_to_close() {
    let state = state().await;
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());

    let session = session_service::create_session(
        &state,
        u1,
        CreateRetrospectiveRequest {
            title: "Sprint 42".into(),
            description: None,
            template: SessionTemplate::StartStopContinue,
            scheduled_at: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(session.status, SessionStatus::Planned);

    let (_, mut u1_room) = connect(&state, session.id, u1, 64);

    session_service::register_participant(&state, session.id, u1)
        .await
        .unwrap();
    let activated = session_service::register_participant(&state, session.id, u2)
        .await
        .unwrap();
    assert_eq!(activated.status, SessionStatus::Active);

    let item = session_service::add_item(
        &state,
        session.id,
        u1,
        AddItemRequest {
            category: "start".into(),
            content: "pair on reviews".into(),
            is_anonymous: false,
        },
    )
    .await
    .unwrap();

    let first = session_service::vote_item(&state, item.id, u2).await.unwrap();
    assert!(first.voted);
    assert_eq!(first.votes, 1);
    let second = session_service::vote_item(&state, item.id, u2).await.unwrap();
    assert!(!second.voted);
    assert_eq!(second.votes, 0);

    let group = session_service::create_group(
        &state,
        session.id,
        u1,
        CreateGroupRequest {
            name: "Collaboration".into(),
            description: None,
            item_ids: vec![item.id],
        },
    )
    .await
    .unwrap();

    let closed = session_service::end_session(&state, session.id, u1)
        .await
        .unwrap();
    assert_eq!(closed.status, SessionStatus::Closed);

    let rejected = session_service::vote_group(&state, group.id, u2).await;
    assert!(matches!(rejected, Err(ServiceError::SessionClosed)));

    let details = session_service::session_details(&state, session.id)
        .await
        .unwrap();
    assert_eq!(details.groups.len(), 1);
    assert_eq!(details.groups[0].votes, 0);
    assert_eq!(details.groups[0].item_ids, vec![item.id]);
    assert_eq!(details.items[0].votes, 0);

    assert_eq!(
        kinds(&mut u1_room),
        vec![
            EventKind::UpdateRetrospective,
            EventKind::UpdateRetrospective,
            EventKind::NewItem,
            EventKind::VoteItem,
            EventKind::UnvoteItem,
            EventKind::NewGroup,
            EventKind::UpdateRetrospective,
        ]
    );
}

#[tokio::test]
async fn stalled_member_does_not_hold_back_the_room() {
    let state = state().await;
    let session = Uuid::new_v4();
    let (_, mut fast_a) = connect(&state, session, Uuid::new_v4(), 8);
    let (_, mut fast_b) = connect(&state, session, Uuid::new_v4(), 8);
    let (stalled_id, _stalled) = connect(&state, session, Uuid::new_v4(), 2);
    // Drain the join announcements.
    kinds(&mut fast_a);
    kinds(&mut fast_b);

    let broadcasts = 5;
    for _ in 0..broadcasts {
        state
            .hub()
            .broadcast_to_room(session, &Envelope::bare(EventKind::UpdateItem));
        for rx in [&mut fast_a, &mut fast_b] {
            let received = kinds(rx);
            assert!(received.contains(&EventKind::UpdateItem));
        }
    }

    assert!(!state.hub().is_registered(stalled_id));
    assert_eq!(state.hub().room_size(session), 2);
    assert!(!state.hub().unregister(stalled_id));
}

#[tokio::test]
async fn events_stay_inside_their_session() {
    let state = state().await;
    let creator = Uuid::new_v4();
    let mut sessions = Vec::new();
    for title in ["Team A", "Team B"] {
        let session = session_service::create_session(
            &state,
            creator,
            CreateRetrospectiveRequest {
                title: title.into(),
                description: None,
                template: SessionTemplate::MadSadGlad,
                scheduled_at: None,
            },
        )
        .await
        .unwrap();
        sessions.push(session.id);
    }

    let (_, mut room_a) = connect(&state, sessions[0], Uuid::new_v4(), 16);
    let mut stream_a = state.fanout().subscribe(sessions[0]);
    let (_, mut room_b) = connect(&state, sessions[1], Uuid::new_v4(), 16);
    let mut stream_b = state.fanout().subscribe(sessions[1]);

    session_service::start_session(&state, sessions[1], creator)
        .await
        .unwrap();
    session_service::set_blur(&state, sessions[1], creator, true)
        .await
        .unwrap();

    assert!(kinds(&mut room_a).is_empty());
    assert!(stream_a.receiver.try_recv().is_err());
    assert_eq!(
        kinds(&mut room_b),
        vec![EventKind::UpdateRetrospective, EventKind::BlurToggled]
    );
    assert_eq!(
        std::iter::from_fn(|| stream_b.receiver.try_recv().ok()).count(),
        2
    );
    assert!(state.fanout().is_blurred(sessions[1]));
    assert!(!state.fanout().is_blurred(sessions[0]));
}
