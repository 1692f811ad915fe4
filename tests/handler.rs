use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use meetping::config::BotConfig;
use meetping::conversation::{ConversationState, ConversationStates};
use meetping::handler::{
    UpdateHandler, ACCESS_DENIED_TEXT, ACCESS_ERROR_TEXT, BLANK_INPUT_TEXT, INVALID_TIME_TEXT,
    NO_SAMPLE_TEXT, WELCOME_TEXT,
};
use meetping::infrastructure::{ChannelMessenger, EngagementStore, Outbound, SqliteStore};
use meetping::models::{ChatId, EngagementState, EventId, ExternalUserId, NewEvent};
use meetping::updates::Update;

const CHAT: i64 = 500;
const SENDER: i64 = 42;

struct Harness {
    store: Arc<SqliteStore>,
    conversations: Arc<ConversationStates>,
    handler: UpdateHandler,
    outbound: UnboundedReceiver<Outbound>,
}

async fn harness(settings: BotConfig) -> Harness {
    let store = Arc::new(SqliteStore::new_in_memory().await.unwrap());
    let (messenger, outbound) = ChannelMessenger::channel();
    let conversations = Arc::new(ConversationStates::new());
    let handler = UpdateHandler::new(
        store.clone(),
        Arc::new(messenger),
        conversations.clone(),
        settings,
    );
    Harness {
        store,
        conversations,
        handler,
        outbound,
    }
}

fn text(body: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 1,
        "message": {
            "message_id": 1,
            "chat": {"id": CHAT},
            "from": {"id": SENDER, "username": "anna"},
            "text": body
        }
    }))
    .unwrap()
}

fn callback(data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 2,
        "callback_query": {
            "id": "cb-1",
            "from": {"id": SENDER, "username": "anna"},
            "message": {"message_id": 9, "chat": {"id": CHAT}},
            "data": data
        }
    }))
    .unwrap()
}

fn texts(rx: &mut UnboundedReceiver<Outbound>) -> Vec<String> {
    let mut sent = Vec::new();
    while let Ok(outbound) = rx.try_recv() {
        match outbound {
            Outbound::Text { text, .. } | Outbound::CallbackAnswer { text, .. } => sent.push(text),
            Outbound::Digest { items, .. } => {
                sent.extend(items.into_iter().map(|i| format!("digest:{}", i.title)))
            }
            Outbound::ActionsRefresh { item, .. } => {
                let labels: Vec<String> = item.actions.into_iter().map(|a| a.label).collect();
                sent.push(format!("refresh:{}", labels.join(" | ")))
            }
        }
    }
    sent
}

#[tokio::test]
async fn test_edit_city_flow() {
    let mut h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("/start")).await.unwrap();
    h.handler.handle_update(text("/edit_city")).await.unwrap();
    assert_eq!(
        h.conversations.get(ChatId(CHAT)).await,
        ConversationState::AwaitingCity
    );

    h.handler.handle_update(text("  Berlin ")).await.unwrap();
    assert!(h.conversations.get(ChatId(CHAT)).await.is_idle());

    let user = h
        .store
        .user_by_external_id(ExternalUserId(SENDER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        h.store.primary_city_name(user.id).await.unwrap().as_deref(),
        Some("Berlin")
    );

    let sent = texts(&mut h.outbound);
    assert!(sent.iter().any(|t| t.contains("City updated")));
    assert!(sent.last().unwrap().contains("City: Berlin"));
}

#[tokio::test]
async fn test_interests_are_split_and_trimmed() {
    let h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("/edit_interests")).await.unwrap();
    h.handler
        .handle_update(text("jazz, hiking,, tech "))
        .await
        .unwrap();

    let user = h
        .store
        .user_by_external_id(ExternalUserId(SENDER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        h.store.interest_names(user.id).await.unwrap(),
        vec!["hiking", "jazz", "tech"]
    );
}

#[tokio::test]
async fn test_last_edit_request_wins() {
    let h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("/edit_city")).await.unwrap();
    h.handler.handle_update(callback("edit_time")).await.unwrap();
    h.handler.handle_update(text("08:15")).await.unwrap();

    let user = h
        .store
        .user_by_external_id(ExternalUserId(SENDER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.digest_time, "08:15");
    assert_eq!(h.store.primary_city(user.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_digest_time_is_stored_verbatim_by_default() {
    let h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("/edit_time")).await.unwrap();
    h.handler.handle_update(text("tomorrow")).await.unwrap();

    let user = h
        .store
        .user_by_external_id(ExternalUserId(SENDER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.digest_time, "tomorrow");
}

#[tokio::test]
async fn test_strict_digest_time_reprompts() {
    let mut h = harness(BotConfig {
        strict_digest_time: true,
        ..BotConfig::default()
    })
    .await;
    h.handler.handle_update(text("/edit_time")).await.unwrap();
    h.handler.handle_update(text("25:99")).await.unwrap();

    assert_eq!(
        h.conversations.get(ChatId(CHAT)).await,
        ConversationState::AwaitingDigestTime
    );
    assert_eq!(texts(&mut h.outbound).last().map(String::as_str), Some(INVALID_TIME_TEXT));

    h.handler.handle_update(text("07:45")).await.unwrap();
    let user = h
        .store
        .user_by_external_id(ExternalUserId(SENDER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.digest_time, "07:45");
}

#[tokio::test]
async fn test_unknown_profile_gets_access_error() {
    let mut h = harness(BotConfig::default()).await;
    // Pending edit for a chat whose sender never registered
    h.conversations
        .set(ChatId(CHAT), ConversationState::AwaitingCity)
        .await;

    h.handler.handle_update(text("Paris")).await.unwrap();

    assert!(h.conversations.get(ChatId(CHAT)).await.is_idle());
    assert_eq!(texts(&mut h.outbound), vec![ACCESS_ERROR_TEXT.to_string()]);
    assert_eq!(h.store.admin_stats().await.unwrap().users, 0);
}

#[tokio::test]
async fn test_idle_text_is_ignored() {
    let mut h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("hello there")).await.unwrap();
    assert!(texts(&mut h.outbound).is_empty());
}

async fn seed_event(store: &SqliteStore, starts_in: Duration) -> EventId {
    let city = store.ensure_city("Berlin").await.unwrap();
    store
        .save_event(NewEvent {
            title: "Open air".to_string(),
            description: "Park concert".to_string(),
            city_id: city,
            starts_at: Utc::now() + starts_in,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_toggle_callbacks() {
    let mut h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("/start")).await.unwrap();
    let event = seed_event(&h.store, Duration::hours(4)).await;
    let user = h
        .store
        .user_by_external_id(ExternalUserId(SENDER))
        .await
        .unwrap()
        .unwrap();
    texts(&mut h.outbound);

    h.handler
        .handle_update(callback(&format!("going_{}", event)))
        .await
        .unwrap();
    assert_eq!(
        h.store.engagement(user.id, event).await.unwrap(),
        EngagementState { liked: true, rsvped: true }
    );
    let sent = texts(&mut h.outbound);
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0], "✅ You're going");
    assert_eq!(sent[1], "refresh:❤️ 1 | ✅ I'm going");
    assert!(sent[2].contains("Your settings"));

    h.handler
        .handle_update(callback(&format!("like_{}", event)))
        .await
        .unwrap();
    assert_eq!(
        h.store.engagement(user.id, event).await.unwrap(),
        EngagementState { liked: false, rsvped: true }
    );
    let sent = texts(&mut h.outbound);
    assert_eq!(sent[0], "Like removed");
    assert_eq!(sent[1], "refresh:❤️ 0 | ✅ I'm going");

    assert_eq!(h.store.admin_stats().await.unwrap().actions, 2);
}

#[tokio::test]
async fn test_unknown_callback_is_ignored() {
    let mut h = harness(BotConfig::default()).await;
    h.handler.handle_update(callback("repeat_digest")).await.unwrap();
    h.handler.handle_update(callback("like_abc")).await.unwrap();
    assert!(texts(&mut h.outbound).is_empty());
}

#[tokio::test]
async fn test_show_sample_delivers_one_item() {
    // First event of a fresh store gets id 1
    let mut h = harness(BotConfig {
        sample_event_id: EventId(1),
        ..BotConfig::default()
    })
    .await;
    h.handler.handle_update(text("/start")).await.unwrap();
    let sample = seed_event(&h.store, Duration::hours(4)).await;
    seed_event(&h.store, Duration::hours(8)).await;
    assert_eq!(sample, EventId(1));
    texts(&mut h.outbound);

    h.handler.handle_update(callback("show_sample_digest")).await.unwrap();
    assert_eq!(texts(&mut h.outbound), vec!["digest:Open air".to_string()]);
}

#[tokio::test]
async fn test_show_sample_without_event() {
    let mut h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("/start")).await.unwrap();
    texts(&mut h.outbound);

    h.handler.handle_update(callback("show_sample_digest")).await.unwrap();
    assert_eq!(texts(&mut h.outbound), vec![NO_SAMPLE_TEXT.to_string()]);
}

#[tokio::test]
async fn test_admin_stats_requires_admin() {
    let mut h = harness(BotConfig {
        admin_username: Some("anna".to_string()),
        ..BotConfig::default()
    })
    .await;
    h.handler.handle_update(text("/adminstats")).await.unwrap();
    let sent = texts(&mut h.outbound);
    assert!(sent[0].contains("Users: 1"));

    let mut other = harness(BotConfig {
        admin_username: Some("stan".to_string()),
        ..BotConfig::default()
    })
    .await;
    other.handler.handle_update(text("/adminstats")).await.unwrap();
    assert_eq!(texts(&mut other.outbound), vec![ACCESS_DENIED_TEXT.to_string()]);
}

#[tokio::test]
async fn test_admin_stats_ignores_display_name() {
    let mut h = harness(BotConfig {
        admin_username: Some("stan".to_string()),
        ..BotConfig::default()
    })
    .await;
    // No handle, only a first name chosen to match the admin
    let spoofed: Update = serde_json::from_value(json!({
        "update_id": 3,
        "message": {
            "message_id": 1,
            "chat": {"id": 9},
            "from": {"id": 9, "first_name": "stan"},
            "text": "/adminstats"
        }
    }))
    .unwrap();

    h.handler.handle_update(spoofed).await.unwrap();
    assert_eq!(texts(&mut h.outbound), vec![ACCESS_DENIED_TEXT.to_string()]);
}

#[tokio::test]
async fn test_text_without_sender_clears_pending_edit() {
    let mut h = harness(BotConfig::default()).await;
    h.conversations
        .set(ChatId(9), ConversationState::AwaitingCity)
        .await;
    let anonymous: Update = serde_json::from_value(json!({
        "update_id": 4,
        "message": {"message_id": 1, "chat": {"id": 9}, "text": "Berlin"}
    }))
    .unwrap();

    h.handler.handle_update(anonymous).await.unwrap();

    assert!(h.conversations.get(ChatId(9)).await.is_idle());
    assert_eq!(texts(&mut h.outbound), vec![ACCESS_ERROR_TEXT.to_string()]);
    assert_eq!(h.store.admin_stats().await.unwrap().users, 0);
}

#[tokio::test]
async fn test_store_failure_clears_pending_edit() {
    let mut h = harness(BotConfig::default()).await;
    h.conversations
        .set(ChatId(CHAT), ConversationState::AwaitingCity)
        .await;
    h.store.pool().close().await;

    assert!(h.handler.handle_update(text("Berlin")).await.is_err());

    assert!(h.conversations.get(ChatId(CHAT)).await.is_idle());
    assert_eq!(texts(&mut h.outbound), vec![ACCESS_ERROR_TEXT.to_string()]);
}

#[tokio::test]
async fn test_blank_city_is_not_saved() {
    let mut h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("/edit_city")).await.unwrap();
    texts(&mut h.outbound);

    h.handler.handle_update(text("   ")).await.unwrap();

    assert!(h.conversations.get(ChatId(CHAT)).await.is_idle());
    assert_eq!(texts(&mut h.outbound), vec![BLANK_INPUT_TEXT.to_string()]);
    let cities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cities")
        .fetch_one(h.store.pool())
        .await
        .unwrap();
    assert_eq!(cities, 0);
}

#[tokio::test]
async fn test_start_drops_pending_edit() {
    let mut h = harness(BotConfig::default()).await;
    h.handler.handle_update(text("/edit_interests")).await.unwrap();
    h.handler.handle_update(text("/start")).await.unwrap();

    assert!(h.conversations.get(ChatId(CHAT)).await.is_idle());
    assert_eq!(texts(&mut h.outbound).last().map(String::as_str), Some(WELCOME_TEXT));

    // Free text after /start is no longer taken as interests
    h.handler.handle_update(text("jazz")).await.unwrap();
    let user = h
        .store
        .user_by_external_id(ExternalUserId(SENDER))
        .await
        .unwrap()
        .unwrap();
    assert!(h.store.interest_names(user.id).await.unwrap().is_empty());
}
