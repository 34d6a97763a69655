use super::subcommands::{bot_row, intent_line, new_bot_from_args, write_default_config};
use crate::agent::IntentDetector;
use crate::bus::Platform;
use crate::store::{BotRepository, SqliteStore};

#[test]
fn test_new_bot_from_args_builds_config() {
    let bot = new_bot_from_args(
        "Telegram",
        "123:ABC".into(),
        Some("https://example.com/hook".into()),
        false,
        None,
        Some("biz-9".into()),
    )
    .unwrap();
    assert_eq!(bot.platform, Platform::Telegram);
    assert!(!bot.config.polling);
    assert_eq!(
        bot.config.webhook_url.as_deref(),
        Some("https://example.com/hook")
    );
    assert_eq!(bot.business_id.as_deref(), Some("biz-9"));
}

#[test]
fn test_new_bot_from_args_rejects_bad_input() {
    assert!(new_bot_from_args("signal", "t".into(), None, true, None, None).is_err());
    assert!(new_bot_from_args("whatsapp", "  ".into(), None, true, None, None).is_err());
}

#[tokio::test]
async fn test_bot_row_shows_first_error_line() {
    let store = SqliteStore::open_in_memory().unwrap();
    let new_bot = new_bot_from_args("whatsapp", "EAAG".into(), None, true, None, None).unwrap();
    let bot = store.create_bot(new_bot).await.unwrap();
    let row = bot_row(&bot);
    assert!(row.starts_with(&bot.id));
    assert!(row.contains("whatsapp"));
    assert!(row.contains("OFFLINE"));

    store
        .update_bot_status(
            &bot.id,
            crate::store::BotStatus::Error,
            Some("getMe failed\nsecond line"),
        )
        .await
        .unwrap();
    let bot = store.get_bot(&bot.id).await.unwrap().unwrap();
    let row = bot_row(&bot);
    assert!(row.ends_with("(getMe failed)"));
}

#[tokio::test]
async fn test_intent_line_lists_keywords() {
    let result = IntentDetector::new().detect("Hola buenos días").await;
    let line = intent_line(&result);
    assert!(line.starts_with("GREETING ("));
    assert!(line.contains("hola"));
}

#[test]
fn test_write_default_config_respects_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    assert!(write_default_config(&path, false).unwrap());
    std::fs::write(&path, r#"{"server": {"port": 9001}}"#).unwrap();

    assert!(!write_default_config(&path, false).unwrap());
    let kept = crate::config::load_config(Some(&path)).unwrap();
    assert_eq!(kept.server.port, 9001);

    assert!(write_default_config(&path, true).unwrap());
    let reset = crate::config::load_config(Some(&path)).unwrap();
    assert_eq!(reset.server.port, crate::config::Config::default().server.port);
}
