use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::bus::Platform;
use crate::channels::base::MessagingProvider;
use crate::channels::telegram::TelegramProvider;
use crate::channels::whatsapp::WhatsAppProvider;
use crate::config::Config;
use crate::errors::{BizbotError, BizbotResult};
use crate::store::Bot;

pub type ProviderBuilder =
    Box<dyn Fn(&Bot) -> BizbotResult<Arc<dyn MessagingProvider>> + Send + Sync>;

/// Platform -> provider constructor.
#[derive(Default)]
pub struct ProviderRegistry {
    builders: HashMap<Platform, ProviderBuilder>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in Telegram and WhatsApp providers.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::empty();

        let telegram_base = config.telegram.api_base.clone();
        registry.register(
            Platform::Telegram,
            Box::new(move |bot: &Bot| {
                if bot.bot_token.trim().is_empty() {
                    return Err(BizbotError::Config(format!(
                        "bot {} has no Telegram token",
                        bot.id
                    )));
                }
                Ok(Arc::new(TelegramProvider::new(
                    &bot.bot_token,
                    bot.config.clone(),
                    &telegram_base,
                )) as Arc<dyn MessagingProvider>)
            }),
        );

        let whatsapp = config.whatsapp.clone();
        registry.register(
            Platform::WhatsApp,
            Box::new(move |bot: &Bot| {
                let phone_number_id = bot
                    .config
                    .phone_number_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .unwrap_or(&whatsapp.phone_number_id);
                Ok(Arc::new(WhatsAppProvider::new(
                    &bot.bot_token,
                    phone_number_id,
                    &whatsapp.api_base,
                )) as Arc<dyn MessagingProvider>)
            }),
        );

        registry
    }

    pub fn register(&mut self, platform: Platform, builder: ProviderBuilder) {
        self.builders.insert(platform, builder);
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.builders.contains_key(&platform)
    }

    pub fn build(&self, bot: &Bot) -> BizbotResult<Arc<dyn MessagingProvider>> {
        let builder = self
            .builders
            .get(&bot.platform)
            .ok_or_else(|| BizbotError::UnsupportedPlatform(bot.platform.to_string()))?;
        debug!("building {} provider for bot {}", bot.platform, bot.id);
        builder(bot)
    }
}
