use super::{BotCommands, open_store};
use anyhow::{Result, bail};
use std::path::Path;

use crate::agent::{AiAgent, IntentResult};
use crate::bus::Platform;
use crate::config::credentials::credential_status;
use crate::config::{Config, get_config_path, load_config, save_config};
use crate::store::{Bot, BotConfig, BotRepository, NewBot};

pub(super) fn init_command(force: bool) -> Result<()> {
    let path = get_config_path()?;
    if write_default_config(&path, force)? {
        println!("\u{2713} Wrote default config to {}", path.display());
        println!("\nNext steps:");
        println!("  1. Set ai.openai.apiKey (or BIZBOT_OPENAI_API_KEY)");
        println!("  2. bizbot bots add --platform telegram --token <token>");
        println!("  3. bizbot serve");
    } else {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    Ok(())
}

/// Returns false when a config exists and `force` is not set.
pub(super) fn write_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    save_config(&Config::default(), Some(path))?;
    Ok(true)
}

pub(super) async fn bots_command(cmd: BotCommands) -> Result<()> {
    let config = load_config(None)?;
    let store = open_store(&config)?;

    match cmd {
        BotCommands::List { platform } => {
            let platform = platform
                .as_deref()
                .map(str::parse::<Platform>)
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let bots = store.list_bots(platform).await?;
            if bots.is_empty() {
                println!("No bots registered.");
                return Ok(());
            }
            println!("Bots ({}):", bots.len());
            for bot in &bots {
                println!("  {}", bot_row(bot));
            }
        }
        BotCommands::Add {
            platform,
            token,
            webhook_url,
            no_polling,
            phone_number_id,
            business_id,
        } => {
            let new_bot = new_bot_from_args(
                &platform,
                token,
                webhook_url,
                !no_polling,
                phone_number_id,
                business_id,
            )?;
            let bot = store.create_bot(new_bot).await?;
            println!("\u{2713} Created {} bot {}", bot.platform, bot.id);
        }
        BotCommands::Remove { id } => {
            if store.delete_bot(&id).await? {
                println!("\u{2713} Removed bot {}", id);
            } else {
                bail!("no bot with id {}", id);
            }
        }
    }
    Ok(())
}

pub(super) fn new_bot_from_args(
    platform: &str,
    token: String,
    webhook_url: Option<String>,
    polling: bool,
    phone_number_id: Option<String>,
    business_id: Option<String>,
) -> Result<NewBot> {
    let platform: Platform = platform.parse().map_err(anyhow::Error::msg)?;
    if token.trim().is_empty() {
        bail!("bot token must not be empty");
    }
    Ok(NewBot {
        business_id,
        platform,
        bot_token: token,
        username: None,
        config: BotConfig {
            polling,
            webhook_url,
            phone_number_id,
            ..BotConfig::default()
        },
    })
}

pub(super) fn bot_row(bot: &Bot) -> String {
    let mut row = format!(
        "{}  {:<8}  {:<8}  {}",
        bot.id,
        bot.platform.as_str(),
        bot.status.as_str(),
        bot.username.as_deref().unwrap_or("-")
    );
    if let Some(err) = bot.error_log.as_deref().and_then(|log| log.lines().next()) {
        row.push_str("  (");
        row.push_str(err);
        row.push(')');
    }
    row
}

pub(super) async fn detect_command(text: &str) -> Result<()> {
    let config = load_config(None)?;
    let agent = AiAgent::from_config(&config.ai)?;

    let detected = agent.detect_intent(text).await;
    println!("{}", intent_line(&detected));

    let candidates = agent.detector().all_possible_intents(text);
    if !candidates.is_empty() {
        println!("\nPattern matches:");
        for candidate in &candidates {
            println!("  {}", intent_line(candidate));
        }
    }
    Ok(())
}

pub(super) fn intent_line(result: &IntentResult) -> String {
    let mut line = format!(
        "{} ({:.2}) {}",
        result.intent.as_str(),
        result.confidence,
        result.context
    );
    if !result.keywords.is_empty() {
        line.push_str(&format!(" [{}]", result.keywords.join(", ")));
    }
    line
}

pub(super) fn status_command() -> Result<()> {
    let config = load_config(None)?;
    let config_path = get_config_path()?;
    let db_path = config.database_path()?;
    let mark = |ok: bool| if ok { "\u{2713}" } else { "\u{2717}" };

    println!("bizbot {} status\n", crate::VERSION);
    println!(
        "Config: {} {}",
        config_path.display(),
        mark(config_path.exists())
    );
    println!("Database: {} {}", db_path.display(), mark(db_path.exists()));
    println!("AI provider: {}", config.ai.provider);
    println!("Gateway: {}:{}", config.server.host, config.server.port);

    println!("\nCredentials:");
    for (name, set) in credential_status(&config) {
        println!("  {:<28} {}", name, if set { "[set]" } else { "[empty]" });
    }
    Ok(())
}
