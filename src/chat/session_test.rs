use super::*;
use crate::chat::test_helpers::{FakeChatApi, FakeTransport};
use tokio::time::{Duration, timeout};

const USER: &str = "user-1";

struct Harness {
    session: Arc<ChatSession>,
    transport: Arc<FakeTransport>,
    api: Arc<FakeChatApi>,
    slot: RoomSlot,
    events: broadcast::Receiver<ChatEvent>,
    topics: ChatTopics,
}

fn harness(cached_room: Option<&str>, rooms: &[&str]) -> Harness {
    let transport = FakeTransport::new();
    let api = FakeChatApi::new(rooms);
    let slot = RoomSlot::new(cached_room.and_then(RoomId::parse));
    transport.watch_room(slot.clone());
    let identity = ChatIdentity { user_id: USER.into(), token: "tok".into() };
    let session = ChatSession::new(
        identity,
        ChatTopics::default(),
        transport.clone(),
        api.clone(),
        slot.clone(),
    );
    let events = session.subscribe_events();
    Harness { session, transport, api, slot, events, topics: ChatTopics::default() }
}

async fn wait_for(rx: &mut broadcast::Receiver<ChatEvent>, pred: impl Fn(&ChatEvent) -> bool) -> ChatEvent {
    loop {
        let event = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("chat event timed out")
            .expect("chat event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

async fn assert_no_event(rx: &mut broadcast::Receiver<ChatEvent>, pred: impl Fn(&ChatEvent) -> bool) {
    while let Ok(Ok(event)) = timeout(Duration::from_millis(80), rx.recv()).await {
        assert!(!pred(&event), "unexpected event: {event:?}");
    }
}

fn room(raw: &str) -> RoomId {
    RoomId::parse(raw).unwrap()
}

fn wire(kind: MessageKind, sender: &str, content: &str) -> String {
    serde_json::to_string(&ChatMessage {
        sender: sender.into(),
        content: content.into(),
        kind,
        timestamp: 5,
        room_id: None,
    })
    .unwrap()
}

// =============================================================================
// connect / handshake
// =============================================================================

#[tokio::test]
async fn connect_twice_starts_transport_once() {
    let mut h = harness(None, &[]);
    h.session.connect().await.unwrap();
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| *e == ChatEvent::Connected).await;

    assert_eq!(h.transport.connects(), 1);
}

#[tokio::test]
async fn connect_without_room_subscribes_notifications_only() {
    let mut h = harness(None, &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| *e == ChatEvent::Connected).await;

    assert_eq!(h.transport.active_topics(), vec![h.topics.notifications(USER)]);
    assert_eq!(h.api.history_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(h.transport.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn connect_with_cached_room_subscribes_loads_history_and_joins() {
    let mut h = harness(Some("r1"), &[]);
    h.api.with_history(
        "r1",
        vec![
            ChatMessage { sender: USER.into(), content: String::new(), kind: MessageKind::Join, timestamp: 1, room_id: None },
            ChatMessage { sender: "agent".into(), content: "earlier".into(), kind: MessageKind::Chat, timestamp: 2, room_id: None },
        ],
    );

    h.session.connect().await.unwrap();
    let history = wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    let ChatEvent::History { entries } = history else { unreachable!() };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "earlier");

    let mut expected = vec![h.topics.notifications(USER), h.topics.room(&room("r1"))];
    expected.sort();
    assert_eq!(h.transport.active_topics(), expected);

    let joins = h.transport.published_to(&h.topics.join(&room("r1")));
    assert_eq!(joins.len(), 1);
    let join: ChatMessage = serde_json::from_str(&joins[0]).unwrap();
    assert_eq!(join.kind, MessageKind::Join);
    assert_eq!(join.sender, USER);

    // The echoed JOIN never reaches the transcript.
    assert_no_event(&mut h.events, |e| matches!(e, ChatEvent::Entry { .. })).await;
    assert_eq!(h.session.transcript().len(), 1);
}

// =============================================================================
// send
// =============================================================================

#[tokio::test]
async fn hello_without_cached_room_creates_one_room_and_one_entry() {
    let mut h = harness(None, &["r-new"]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| *e == ChatEvent::Connected).await;

    h.session.send("Hello").await.unwrap();

    assert_eq!(h.api.creates(), 1);
    assert_eq!(h.slot.get(), Some(room("r-new")));
    // The id was stored before the publish went out.
    assert_eq!(*h.transport.room_at_publish.lock().unwrap(), vec![Some(room("r-new"))]);

    let sent = h.transport.published_to(&h.topics.send(&room("r-new")));
    assert_eq!(sent.len(), 1);
    let msg: ChatMessage = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(msg.kind, MessageKind::Chat);
    assert_eq!(msg.content, "Hello");

    let assigned = wait_for(&mut h.events, |e| matches!(e, ChatEvent::RoomAssigned { .. })).await;
    assert_eq!(assigned, ChatEvent::RoomAssigned { room_id: room("r-new"), storage_key: "chatRoomId" });

    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Entry { .. })).await;
    let transcript = h.session.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].content, "Hello");
    assert!(transcript[0].is_self);
}

#[tokio::test]
async fn second_send_reuses_the_room() {
    let mut h = harness(None, &["r-new", "r-other"]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| *e == ChatEvent::Connected).await;

    h.session.send("one").await.unwrap();
    h.session.send("two").await.unwrap();

    assert_eq!(h.api.creates(), 1);
    assert_eq!(h.transport.published_to(&h.topics.send(&room("r-new"))).len(), 2);
}

#[tokio::test]
async fn concurrent_first_sends_each_create_a_room() {
    let mut h = harness(None, &["r-a", "r-b"]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| *e == ChatEvent::Connected).await;

    let (first, second) = tokio::join!(h.session.send("one"), h.session.send("two"));
    first.unwrap();
    second.unwrap();

    // Not serialized: both sends saw an empty slot and the last id stored wins.
    assert_eq!(h.api.creates(), 2);
    assert_eq!(h.slot.get(), Some(room("r-b")));
    assert_eq!(h.transport.published_to(&h.topics.send(&room("r-a"))).len(), 1);
    assert_eq!(h.transport.published_to(&h.topics.send(&room("r-b"))).len(), 1);
    // The first room's subscription lingers until release.
    let topics = h.session.active_topics();
    assert!(topics.contains(&h.topics.room(&room("r-a"))));
    assert!(topics.contains(&h.topics.room(&room("r-b"))));

    h.session.release();
    assert!(h.session.active_topics().is_empty());
}

#[tokio::test]
async fn send_before_connect_returns_draft() {
    let h = harness(Some("r1"), &[]);
    let err = h.session.send("are you there?").await.unwrap_err();
    assert_eq!(err.draft, "are you there?");
    assert!(matches!(err.error, ChatError::NotConnected));
}

#[tokio::test]
async fn failed_publish_returns_draft_for_resubmission() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    h.transport.set_fail_publish(true);
    let err = h.session.send("Hello there").await.unwrap_err();
    assert_eq!(err.draft, "Hello there");
    assert!(matches!(err.error, ChatError::Transport(TransportError::NotConnected)));
}

#[tokio::test]
async fn failed_room_creation_keeps_slot_empty() {
    let mut h = harness(None, &["r-new"]);
    h.api.set_fail_create(true);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| *e == ChatEvent::Connected).await;

    let err = h.session.send("hi").await.unwrap_err();
    assert_eq!(err.draft, "hi");
    assert!(matches!(err.error, ChatError::Backend(_)));
    assert!(err.error.retryable());
    assert!(h.slot.get().is_none());
    assert!(h.transport.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| *e == ChatEvent::Connected).await;

    let err = h.session.send("   ").await.unwrap_err();
    assert!(matches!(err.error, ChatError::EmptyMessage));
    assert_eq!(err.error.error_code(), "E_CHAT_EMPTY_MESSAGE");
}

// =============================================================================
// inbound
// =============================================================================

#[tokio::test]
async fn only_chat_and_system_assign_reach_the_transcript() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    let topic = h.topics.room(&room("r1"));
    h.transport.deliver(&topic, &wire(MessageKind::Join, "agent", ""));
    h.transport.deliver(&topic, &wire(MessageKind::SystemAssign, "system", "Agent Mai is helping you"));
    h.transport.deliver(&topic, &wire(MessageKind::Leave, "agent", ""));
    h.transport.deliver(&topic, &wire(MessageKind::Chat, "agent", "How can I help?"));

    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Entry { entry } if entry.content == "How can I help?")).await;
    let kinds: Vec<MessageKind> = h.session.transcript().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [MessageKind::SystemAssign, MessageKind::Chat]);
}

#[tokio::test]
async fn malformed_room_payload_is_ignored() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    h.transport.deliver(&h.topics.room(&room("r1")), "not json");
    assert_no_event(&mut h.events, |e| matches!(e, ChatEvent::Entry { .. })).await;
    assert!(h.session.transcript().is_empty());
}

#[tokio::test]
async fn notifications_toast_only_for_other_rooms() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    let topic = h.topics.notifications(USER);
    h.transport
        .deliver(&topic, r#"{"sender":"agent","roomId":"r1","preview":"same room"}"#);
    h.transport
        .deliver(&topic, r#"{"sender":"agent","roomId":"r2","preview":"elsewhere"}"#);

    let toast = wait_for(&mut h.events, |e| matches!(e, ChatEvent::Toast { .. })).await;
    let ChatEvent::Toast { notification } = toast else { unreachable!() };
    assert_eq!(notification.preview, "elsewhere");
    assert_no_event(&mut h.events, |e| matches!(e, ChatEvent::Toast { .. })).await;
}

// =============================================================================
// lifecycle
// =============================================================================

#[tokio::test]
async fn release_unsubscribes_everything_and_leaves() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;
    assert_eq!(h.transport.active_topics().len(), 2);

    h.session.release();

    assert!(h.transport.active_topics().is_empty());
    assert!(h.session.active_topics().is_empty());
    assert_eq!(h.transport.unsubscribed.lock().unwrap().len(), 2);
    assert_eq!(h.transport.published_to(&h.topics.leave(&room("r1"))).len(), 1);
    assert!(h.transport.is_closed());
}

#[tokio::test]
async fn reconnect_reruns_handshake() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    h.transport.drop_connection();
    wait_for(&mut h.events, |e| *e == ChatEvent::Disconnected).await;
    assert!(h.session.active_topics().is_empty());

    h.transport.reconnect();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    assert_eq!(h.api.history_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(h.transport.published_to(&h.topics.join(&room("r1"))).len(), 2);
    assert_eq!(h.session.active_topics().len(), 2);
    // Nothing was unsubscribed explicitly: the broker already dropped them.
    assert!(h.transport.unsubscribed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn switch_room_releases_previous_topic() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    h.session.switch_room(room("r2")).await.unwrap();

    let topics = h.session.active_topics();
    assert!(topics.contains(&h.topics.room(&room("r2"))));
    assert!(!topics.contains(&h.topics.room(&room("r1"))));
    assert_eq!(h.transport.published_to(&h.topics.leave(&room("r1"))).len(), 1);
    assert_eq!(h.slot.get(), Some(room("r2")));
}

#[tokio::test]
async fn failed_switch_keeps_previous_room() {
    let mut h = harness(Some("r1"), &[]);
    h.session.connect().await.unwrap();
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::History { .. })).await;

    h.transport.set_fail_subscribe(true);
    let err = h.session.switch_room(room("r2")).await.unwrap_err();
    assert!(matches!(err, ChatError::Transport(TransportError::NotConnected)));

    assert_eq!(h.slot.get(), Some(room("r1")));
    let topics = h.session.active_topics();
    assert!(topics.contains(&h.topics.room(&room("r1"))));
    assert!(!topics.contains(&h.topics.room(&room("r2"))));
    assert!(h.transport.published_to(&h.topics.leave(&room("r1"))).is_empty());
    assert_no_event(&mut h.events, |e| matches!(e, ChatEvent::RoomAssigned { .. })).await;

    // Room traffic for r1 still reaches the transcript.
    h.transport.deliver(&h.topics.room(&room("r1")), &wire(MessageKind::Chat, "agent", "still here"));
    let entry = wait_for(&mut h.events, |e| matches!(e, ChatEvent::Entry { .. })).await;
    let ChatEvent::Entry { entry } = entry else { unreachable!() };
    assert_eq!(entry.content, "still here");
}
