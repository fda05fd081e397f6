mod common;

use common::{TestApp, settle};
use cove_messaging::config::RealtimeConfig;
use cove_messaging::error::AppError;
use cove_messaging::services::inbox::MessageState;
use cove_messaging::services::inbox::session::InboxSession;
use cove_messaging::services::realtime::ListenerSignal;
use cove_messaging::storage::ConversationRepo;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn open_conversation_receives_replies_without_unread() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);

    let mut session = app.open_session(u1).await;
    let conversation = session.create_conversation(u2, "Hello").await.expect("create");
    session.select(Some(conversation.id)).await;

    assert_eq!(session.inbox().message_state(), MessageState::Loaded);
    assert_eq!(session.inbox().messages().len(), 1);

    // The counterpart replies from their own client.
    app.gateway.send(u2, conversation.id, "Hi back", None).await.expect("reply");
    settle(&mut session).await;

    let contents: Vec<&str> =
        session.inbox().messages().iter().filter_map(|m| m.content.as_deref()).collect();
    assert_eq!(contents, vec!["Hello", "Hi back"]);
    // The conversation is open, so the reply lands already read.
    assert_eq!(session.unread_count(), 0);
}

#[tokio::test]
async fn reply_while_conversation_is_closed_increments_unread() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);

    let mut session = app.open_session(u1).await;
    let conversation = session.create_conversation(u2, "Hello").await.expect("create");
    session.select(Some(conversation.id)).await;
    session.select(None).await;

    app.gateway.send(u2, conversation.id, "You there?", None).await.expect("reply");
    settle(&mut session).await;

    assert_eq!(session.unread_count(), 1);
    assert!(!session.inbox().summaries()[0].conversation.is_read);
    assert_eq!(
        session.inbox().summaries()[0].last_message.as_ref().and_then(|m| m.content.as_deref()),
        Some("You there?")
    );
}

#[tokio::test]
async fn own_sends_never_notify_the_sender() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);

    let mut session = app.open_session(u1).await;
    let conversation = session.create_conversation(u2, "Hello").await.expect("create");
    session.select(Some(conversation.id)).await;

    let sent = session.send(conversation.id, "And another thing", None).await.expect("send");
    // The push copy of the same row arrives behind the synchronous one.
    settle(&mut session).await;

    assert_eq!(session.unread_count(), 0);
    let copies =
        session.inbox().messages().iter().filter(|m| m.id == sent.id).count();
    assert_eq!(copies, 1, "the push copy must deduplicate against the synchronous one");
}

#[tokio::test]
async fn two_clients_same_actor_dedup() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);

    let mut device_a = app.open_session(u1).await;
    let conversation = device_a.create_conversation(u2, "Hello").await.expect("create");

    let mut device_b = app.open_session(u1).await;
    device_a.select(Some(conversation.id)).await;
    device_b.select(Some(conversation.id)).await;

    let sent = device_a.send(conversation.id, "from device a", None).await.expect("send");
    settle(&mut device_a).await;
    settle(&mut device_b).await;

    // The sending device holds one copy; the other device receives exactly
    // one through the push channel. Neither inbox is flagged unread.
    for session in [&device_a, &device_b] {
        let copies = session.inbox().messages().iter().filter(|m| m.id == sent.id).count();
        assert_eq!(copies, 1);
        assert_eq!(session.unread_count(), 0);
    }
}

#[tokio::test]
async fn incoming_message_moves_conversation_to_front() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    let u3 = app.register_user("User Three", "three");
    app.store.add_follow(u1, u2);
    app.store.add_follow(u1, u3);

    let mut session = app.open_session(u1).await;
    let with_u2 = session.create_conversation(u2, "first").await.expect("create");
    let _with_u3 = session.create_conversation(u3, "second").await.expect("create");
    assert_ne!(session.inbox().summaries()[0].conversation.id, with_u2.id);

    app.gateway.send(u2, with_u2.id, "bump", None).await.expect("send");
    settle(&mut session).await;

    assert_eq!(session.inbox().summaries()[0].conversation.id, with_u2.id);
    assert_eq!(
        session.inbox().summaries()[0].last_message.as_ref().map(|m| m.preview()),
        Some("bump")
    );
}

#[tokio::test]
async fn push_for_unlisted_conversation_triggers_a_refresh() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);

    // u2 signs in before any conversation with u1 exists.
    let mut session = app.open_session(u2).await;
    assert!(session.inbox().summaries().is_empty());

    app.gateway.create_conversation(u1, u2, "knock knock").await.expect("create");
    settle(&mut session).await;

    // The bare event payload cannot carry u1's profile; the refresh fills it.
    assert_eq!(session.inbox().summaries().len(), 1);
    assert_eq!(session.inbox().summaries()[0].other.handle, "one");
    assert_eq!(session.unread_count(), 1);
}

#[tokio::test]
async fn resync_signal_repulls_the_snapshot() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);

    let mut session = app.open_session(u2).await;
    assert!(session.inbox().summaries().is_empty());

    // The conversation appears while this client's channel is (notionally)
    // down; the resync path must recover it from the pull endpoint.
    app.gateway.create_conversation(u1, u2, "missed this").await.expect("create");
    session.handle_signal(ListenerSignal::Resync).await;

    assert_eq!(session.inbox().summaries().len(), 1);
    assert_eq!(session.unread_count(), 1);
}

#[tokio::test]
async fn delete_clears_selection_and_working_set() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);

    let mut session = app.open_session(u1).await;
    let conversation = session.create_conversation(u2, "short-lived").await.expect("create");
    session.select(Some(conversation.id)).await;

    session.delete_conversation(conversation.id).await.expect("delete");

    assert_eq!(session.inbox().selected(), None);
    assert!(session.inbox().summaries().is_empty());
    assert!(session.inbox().messages().is_empty());
}

#[tokio::test]
async fn run_loop_applies_push_events_and_stops_on_shutdown() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);
    let conversation = app.gateway.create_conversation(u1, u2, "Hello").await.expect("create");

    let mut session = app.open_session(u1).await;
    let worker = tokio::spawn(async move {
        session.run().await;
        session
    });
    tokio::time::sleep(Duration::from_millis(25)).await;

    app.gateway.send(u2, conversation.id, "while running", None).await.expect("send");
    tokio::time::sleep(Duration::from_millis(50)).await;

    app.shutdown();
    let session = tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .expect("the loop must exit once the shutdown watch flips")
        .expect("session task");

    assert_eq!(session.unread_count(), 1);
    assert_eq!(
        session.inbox().summaries()[0].last_message.as_ref().and_then(|m| m.content.as_deref()),
        Some("while running")
    );
}

#[tokio::test]
async fn unread_poll_refreshes_a_stale_snapshot() {
    let app = TestApp::with_realtime_config(RealtimeConfig {
        unread_poll_interval_secs: 1,
        ..RealtimeConfig::default()
    });
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");

    let mut session = app.open_session(u1).await;
    assert!(session.inbox().summaries().is_empty());
    let worker = tokio::spawn(async move {
        session.run().await;
        session
    });
    tokio::time::sleep(Duration::from_millis(25)).await;

    // Rows land behind the push channel's back; only the poll can see them.
    app.store.create_direct(u1, u2).await.expect("create rows");
    tokio::time::sleep(Duration::from_millis(1400)).await;

    app.shutdown();
    let session = tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .expect("the loop must exit once the shutdown watch flips")
        .expect("session task");

    assert_eq!(session.inbox().summaries().len(), 1);
}

#[tokio::test]
async fn lagged_subscription_resyncs_from_the_pull_endpoints() {
    let app = TestApp::with_realtime_config(RealtimeConfig {
        channel_capacity: 1,
        ..RealtimeConfig::default()
    });
    let u1 = app.register_user("User One", "one");
    let u2 = app.register_user("User Two", "two");
    app.store.add_follow(u1, u2);
    let conversation = app.gateway.create_conversation(u1, u2, "Hello").await.expect("create");

    let mut session = app.open_session(u1).await;

    // Back-to-back publishes against a capacity-1 channel overflow the
    // subscription before the listener task gets scheduled; the listener must
    // resubscribe and recover through the pull endpoints.
    for text in ["one", "two", "three"] {
        app.gateway.send(u2, conversation.id, text, None).await.expect("send");
    }
    settle(&mut session).await;

    assert_eq!(
        session.inbox().summaries()[0].last_message.as_ref().and_then(|m| m.content.as_deref()),
        Some("three")
    );
    assert_eq!(session.unread_count(), 1);
}

#[tokio::test]
async fn session_requires_an_authenticated_actor() {
    let app = TestApp::new();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result =
        InboxSession::open(None, app.gateway.clone(), &app.hub, &app.realtime_config, shutdown_rx);

    assert!(matches!(result, Err(AppError::NotAuthenticated)));
}

#[tokio::test]
async fn session_cannot_open_against_a_closed_hub() {
    let app = TestApp::new();
    let u1 = app.register_user("User One", "one");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    app.hub.close();
    let result =
        InboxSession::open(Some(u1), app.gateway.clone(), &app.hub, &app.realtime_config, shutdown_rx);

    assert!(matches!(result, Err(AppError::EventChannelDropped)));
}
