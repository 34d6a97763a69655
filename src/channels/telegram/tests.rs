use super::*;
use serde_json::json;
use crate::channels::base::message_callback;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:ABC";

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
}

async fn mock_get_me(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ok(json!({
            "id": 42, "is_bot": true, "first_name": "Tienda", "username": "tienda_bot"
        })))
        .mount(server)
        .await;
}

fn provider(server: &MockServer, config: BotConfig) -> TelegramProvider {
    TelegramProvider::new(TOKEN, config, &server.uri())
}

fn no_polling() -> BotConfig {
    BotConfig {
        polling: false,
        ..BotConfig::default()
    }
}

fn channel_handler() -> (MessageCallback, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = message_callback(move |msg| {
        let tx = tx.clone();
        async move {
            tx.send(msg)?;
            Ok(())
        }
    });
    (handler, rx)
}

fn text_update() -> Value {
    json!({
        "update_id": 1001,
        "message": {
            "message_id": 77,
            "from": {
                "id": 555, "is_bot": false, "first_name": "Ana",
                "username": "ana_g", "language_code": "es"
            },
            "chat": { "id": 555, "type": "private" },
            "date": 1_700_000_000,
            "text": "Hola buenos días"
        }
    })
}

#[test]
fn test_convert_text_message() {
    let update: TgUpdate = serde_json::from_value(text_update()).unwrap();
    let msg = convert_message(update.message.as_ref().unwrap()).unwrap();
    assert_eq!(msg.chat_id, "555");
    assert_eq!(msg.user_id, "555");
    assert_eq!(msg.text, "Hola buenos días");
    assert_eq!(msg.kind, MessageKind::Text);
    assert_eq!(msg.message_id.as_deref(), Some("77"));
    assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
    assert_eq!(msg.display_name(), "Ana");
    assert_eq!(msg.metadata["chatType"], "private");
}

#[test]
fn test_raw_update_roundtrip_preserves_fields() {
    let update: TgUpdate = serde_json::from_value(text_update()).unwrap();
    let back = serde_json::to_value(&update).unwrap();
    assert_eq!(back["update_id"], 1001);
    assert_eq!(back["message"]["from"]["username"], "ana_g");
    assert_eq!(back["message"]["text"], "Hola buenos días");
}

#[test]
fn test_convert_media_placeholders() {
    let base = json!({ "message_id": 1, "chat": { "id": 9, "type": "private" }, "date": 0 });
    let with = |extra: Value| -> TgMessage {
        let mut v = base.clone();
        v.as_object_mut()
            .unwrap()
            .extend(extra.as_object().unwrap().clone());
        serde_json::from_value(v).unwrap()
    };

    let photo = convert_message(&with(json!({ "photo": [{}, {}, {}] }))).unwrap();
    assert_eq!(photo.text, "[Photo: 3 sizes]");
    assert_eq!(photo.kind, MessageKind::Photo);

    let doc = convert_message(&with(json!({ "document": { "file_name": "menu.pdf" } }))).unwrap();
    assert_eq!(doc.text, "[Document: menu.pdf]");

    let audio = convert_message(&with(json!({ "audio": { "duration": 12 } }))).unwrap();
    assert_eq!(audio.text, "[Audio: 12s]");

    let video = convert_message(&with(json!({ "video": {} }))).unwrap();
    assert_eq!(video.text, "[Video: 0s]");

    assert!(convert_message(&with(json!({ "sticker": { "emoji": "👍" } }))).is_none());
}

#[tokio::test]
async fn test_stop_before_initialize_is_ok() {
    let server = MockServer::start().await;
    let tg = provider(&server, BotConfig::default());
    tg.stop().await.unwrap();
    tg.stop().await.unwrap();
    assert!(!tg.is_polling());
}

#[tokio::test]
async fn test_initialize_rejects_bad_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false, "error_code": 401, "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let tg = provider(&server, BotConfig::default());
    let err = tg.initialize().await.unwrap_err();
    assert!(format!("{err:#}").contains("Unauthorized"));
    assert!(!tg.is_polling());
}

#[tokio::test]
async fn test_initialize_polling_delivers_updates() {
    let server = MockServer::start().await;
    mock_get_me(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 0 })))
        .respond_with(ok(json!([text_update()])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let tg = provider(
        &server,
        BotConfig {
            polling_interval: 10,
            ..BotConfig::default()
        },
    );
    let (handler, mut rx) = channel_handler();
    tg.on_message(handler);
    tg.initialize().await.unwrap();
    assert_eq!(tg.username().as_deref(), Some("tienda_bot"));
    assert!(tg.is_polling());

    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.text, "Hola buenos días");

    tg.stop().await.unwrap();
    assert!(!tg.is_polling());
    assert_eq!(tg.handler_count(), 0);
}

#[tokio::test]
async fn test_polling_slow_chat_does_not_block_batch() {
    let server = MockServer::start().await;
    mock_get_me(&server).await;
    let mut quick = text_update();
    quick["update_id"] = json!(1002);
    quick["message"]["from"]["id"] = json!(999);
    quick["message"]["chat"]["id"] = json!(999);
    quick["message"]["text"] = json!("precio");
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 0 })))
        .respond_with(ok(json!([text_update(), quick])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler = message_callback(move |msg: Message| {
        let tx = tx.clone();
        async move {
            if msg.user_id == "555" {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            tx.send(msg.user_id)?;
            Ok(())
        }
    });

    let tg = provider(
        &server,
        BotConfig {
            polling_interval: 10,
            ..BotConfig::default()
        },
    );
    tg.on_message(handler);
    tg.initialize().await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, "999");
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, "555");

    tg.stop().await.unwrap();
}

#[tokio::test]
async fn test_webhook_mode_sets_and_deletes_webhook() {
    let server = MockServer::start().await;
    mock_get_me(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/setWebhook")))
        .and(body_partial_json(json!({
            "url": "https://bots.example.com/api/webhooks/telegram/b1",
            "max_connections": 100
        })))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/deleteWebhook")))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    let tg = provider(
        &server,
        BotConfig {
            webhook_url: Some("https://bots.example.com/api/webhooks/telegram/b1".into()),
            ..BotConfig::default()
        },
    );
    tg.initialize().await.unwrap();
    assert!(!tg.is_polling());
    tg.stop().await.unwrap();
    // second stop must not delete again
    tg.stop().await.unwrap();
}

#[tokio::test]
async fn test_webhook_payload_dispatches_message() {
    let server = MockServer::start().await;
    let tg = provider(&server, no_polling());
    let (handler, mut rx) = channel_handler();
    tg.on_message(handler);

    tg.handle_webhook_payload(text_update()).await.unwrap();
    let msg = rx.try_recv().unwrap();
    assert_eq!(msg.platform, Platform::Telegram);
    assert_eq!(msg.user_info.unwrap().username.as_deref(), Some("ana_g"));

    assert!(tg.handle_webhook_payload(json!({ "nope": true })).await.is_err());
}

#[tokio::test]
async fn test_callback_query_dispatched_then_answered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/answerCallbackQuery")))
        .and(body_partial_json(json!({ "callback_query_id": "cb-1" })))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    let tg = provider(&server, no_polling());
    let (handler, mut rx) = channel_handler();
    tg.on_message(handler);

    tg.handle_webhook_payload(json!({
        "update_id": 5,
        "callback_query": {
            "id": "cb-1",
            "from": { "id": 555, "first_name": "Ana" },
            "message": { "message_id": 3, "chat": { "id": 555, "type": "private" }, "date": 0 },
            "data": "precios"
        }
    }))
    .await
    .unwrap();

    let msg = rx.try_recv().unwrap();
    assert_eq!(msg.kind, MessageKind::Callback);
    assert_eq!(msg.text, "precios");
    assert_eq!(msg.chat_id, "555");
}

#[tokio::test]
async fn test_send_message_splits_long_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({ "chat_id": "555" })))
        .respond_with(ok(json!({ "message_id": 1, "chat": { "id": 555 } })))
        .expect(3)
        .mount(&server)
        .await;

    let tg = provider(&server, no_polling());
    assert!(tg.send_message("555", &"a".repeat(9000)).await);
}

#[tokio::test]
async fn test_send_message_failure_returns_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false, "error_code": 400, "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let tg = provider(&server, no_polling());
    assert!(!tg.send_message("0", "hola").await);
}

#[tokio::test]
async fn test_lookup_username_is_best_effort() {
    let server = MockServer::start().await;
    mock_get_me(&server).await;
    assert_eq!(
        lookup_username(&server.uri(), TOKEN).await.as_deref(),
        Some("tienda_bot")
    );
    assert!(lookup_username(&server.uri(), "other:token").await.is_none());
}
