mod common;

use bizbot::bus::{Message, MessageKind, Platform};
use bizbot::handler::TEXT_ONLY_REPLY;
use bizbot::store::{ConversationStatus, ConversationStore, Direction};
use common::{Harness, ScriptedAi};

fn text(user: &str, body: &str) -> Message {
    Message::text(Platform::Telegram, user, user, body)
}

#[tokio::test]
async fn test_greeting_gets_ai_reply_and_is_persisted() {
    let h = Harness::new(ScriptedAi::with_replies(&["¡Hola! ¿En qué te ayudo?"]));

    let mut msg = text("555", "Hola buenos días");
    msg.message_id = Some("77".into());
    let reply = h.handler.handle(&msg).await;
    assert_eq!(reply, "¡Hola! ¿En qué te ayudo?");

    let user = h
        .store
        .upsert_user(Platform::Telegram, "555", "555")
        .await
        .unwrap();
    let conversation = h.store.active_conversation(&user.id).await.unwrap();
    let stored = h.store.recent_messages(&conversation.id, 10).await.unwrap();
    assert_eq!(stored.len(), 2);
    // Most recent first
    assert_eq!(stored[0].direction, Direction::Outbound);
    assert_eq!(stored[0].message_id, "77-ai");
    assert_eq!(stored[1].direction, Direction::Inbound);
    assert_eq!(stored[1].content, "Hola buenos días");
}

#[tokio::test]
async fn test_each_message_adds_two_rows_even_when_ai_fails() {
    let h = Harness::new(ScriptedAi::new());
    h.ai.fail_next(1);

    let first = h.handler.handle(&text("u1", "Necesito ayuda con ventas")).await;
    assert!(!first.is_empty());
    let second = h.handler.handle(&text("u1", "¿Cuánto cuesta?")).await;
    assert_eq!(second, "Respuesta de prueba");

    let user = h.store.upsert_user(Platform::Telegram, "u1", "u1").await.unwrap();
    let conversation = h.store.active_conversation(&user.id).await.unwrap();
    assert_eq!(h.store.message_count(&conversation.id).await.unwrap(), 4);
}

#[tokio::test]
async fn test_fallback_reply_includes_intent_guidance() {
    let h = Harness::new(ScriptedAi::new());
    h.ai.fail_next(1);

    let reply = h.handler.handle(&text("u2", "Hola")).await;
    assert!(reply.contains("\n\n"));
    assert_ne!(reply, "Respuesta de prueba");
}

#[tokio::test]
async fn test_history_is_sent_to_the_vendor_in_order() {
    let h = Harness::new(ScriptedAi::with_replies(&["uno", "dos", "tres"]));

    h.handler.handle(&text("u3", "primero")).await;
    h.handler.handle(&text("u3", "segundo")).await;
    h.handler.handle(&text("u3", "tercero")).await;

    let calls = h.ai.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    let contents: Vec<&str> = calls[2].messages.iter().map(|m| m.content.as_str()).collect();
    assert!(!contents[0].is_empty());
    assert_eq!(&contents[1..], &["primero", "uno", "segundo", "dos", "tercero"]);
}

#[tokio::test]
async fn test_non_text_message_is_not_sent_to_ai() {
    let h = Harness::new(ScriptedAi::new());
    let mut msg = text("u4", "[Photo: 3 sizes]");
    msg.kind = MessageKind::Photo;

    assert_eq!(h.handler.handle(&msg).await, TEXT_ONLY_REPLY);
    assert_eq!(h.ai.call_count(), 0);
}

#[tokio::test]
async fn test_one_active_conversation_per_user() {
    let h = Harness::new(ScriptedAi::new());
    for body in ["hola", "precio", "gracias"] {
        h.handler.handle(&text("u5", body)).await;
    }

    let user = h.store.upsert_user(Platform::Telegram, "u5", "u5").await.unwrap();
    let conversations = h.store.conversations_for_user(&user.id).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].status, ConversationStatus::Active);
}

#[tokio::test]
async fn test_same_id_on_different_platforms_is_two_users() {
    let h = Harness::new(ScriptedAi::new());
    h.handler.handle(&text("42", "hola")).await;
    h.handler
        .handle(&Message::text(Platform::WhatsApp, "42", "42", "hola"))
        .await;

    let tg = h.store.upsert_user(Platform::Telegram, "42", "x").await.unwrap();
    let wa = h.store.upsert_user(Platform::WhatsApp, "42", "x").await.unwrap();
    assert_ne!(tg.id, wa.id);
}
