//! Persistence boundary for bots, users, conversations and messages.

pub mod models;
pub mod sqlite;

use async_trait::async_trait;

use crate::bus::Platform;
use crate::errors::BizbotResult;

pub use models::{
    Bot, BotConfig, BotStatus, BotUpdate, Conversation, ConversationStatus, Direction, NewBot,
    NewMessage, StoredMessage, UnifiedUser, UserUpdate,
};
pub use sqlite::SqliteStore;

/// Number of history rows handed to the message pipeline.
pub const HISTORY_PAGE_SIZE: usize = 10;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Find-or-create by `platform:platform_user_id`, refreshing the name.
    async fn upsert_user(
        &self,
        platform: Platform,
        platform_user_id: &str,
        name: &str,
    ) -> BizbotResult<UnifiedUser>;

    async fn get_user(&self, id: &str) -> BizbotResult<Option<UnifiedUser>>;

    async fn update_user(&self, id: &str, update: UserUpdate) -> BizbotResult<UnifiedUser>;

    /// The user's single ACTIVE conversation, created on first use.
    async fn active_conversation(&self, user_id: &str) -> BizbotResult<Conversation>;

    async fn close_conversation(&self, conversation_id: &str) -> BizbotResult<()>;

    async fn conversations_for_user(&self, user_id: &str) -> BizbotResult<Vec<Conversation>>;

    /// Most recent first.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> BizbotResult<Vec<StoredMessage>>;

    /// Insert both rows in one transaction, or neither.
    async fn save_exchange(
        &self,
        conversation_id: &str,
        inbound: NewMessage,
        outbound: NewMessage,
    ) -> BizbotResult<()>;

    async fn message_count(&self, conversation_id: &str) -> BizbotResult<usize>;
}

#[async_trait]
pub trait BotRepository: Send + Sync {
    async fn create_bot(&self, bot: NewBot) -> BizbotResult<Bot>;

    async fn get_bot(&self, id: &str) -> BizbotResult<Option<Bot>>;

    async fn list_bots(&self, platform: Option<Platform>) -> BizbotResult<Vec<Bot>>;

    async fn list_bots_by_status(&self, statuses: &[BotStatus]) -> BizbotResult<Vec<Bot>>;

    /// First bot (oldest) of `platform` whose status is one of `statuses`.
    async fn find_bot_for_platform(
        &self,
        platform: Platform,
        statuses: &[BotStatus],
    ) -> BizbotResult<Option<Bot>>;

    async fn update_bot(&self, id: &str, update: BotUpdate) -> BizbotResult<Bot>;

    /// Persist a status transition. ONLINE refreshes last-active; the error
    /// text replaces the stored one and `None` clears it.
    async fn update_bot_status(
        &self,
        id: &str,
        status: BotStatus,
        error: Option<&str>,
    ) -> BizbotResult<()>;

    async fn delete_bot(&self, id: &str) -> BizbotResult<bool>;
}
