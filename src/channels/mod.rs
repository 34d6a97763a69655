pub mod base;
pub mod factory;
pub mod manager;
pub mod telegram;
pub mod whatsapp;

pub use base::{HandlerSet, MessageCallback, MessagingProvider, message_callback};
pub use factory::ProviderRegistry;
pub use manager::BotManager;
