//! Bot lifecycle: one live [`MessagingProvider`] per running bot id.
//!
//! State machine per bot: `OFFLINE -> STARTING -> ONLINE -> STOPPING -> OFFLINE`,
//! with `ERROR` reachable from any failing step and recoverable by `start`.
//! The in-memory instance map decides who receives traffic; the persisted
//! status mirrors it and is reconciled at boot by `load_from_persistence`.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::bus::Platform;
use crate::channels::base::{MessagingProvider, message_callback};
use crate::channels::factory::ProviderRegistry;
use crate::errors::{BizbotError, BizbotResult};
use crate::handler::MessageHandler;
use crate::store::{Bot, BotRepository, BotStatus, BotUpdate};

pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Statuses that mean "should be running" when the process boots.
const RESUMABLE: [BotStatus; 2] = [BotStatus::Online, BotStatus::Starting];

type LockMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Holds one bot's lifecycle lock. On drop the map entry is pruned when no
/// other caller holds or awaits it.
struct LifecycleGuard<'a> {
    locks: &'a LockMap,
    bot_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LifecycleGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.bot_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.bot_id);
        }
    }
}

pub struct BotManager {
    repo: Arc<dyn BotRepository>,
    registry: ProviderRegistry,
    handler: Arc<MessageHandler>,
    instances: RwLock<HashMap<String, Arc<dyn MessagingProvider>>>,
    lifecycle_locks: LockMap,
    restart_delay: Duration,
}

impl BotManager {
    pub fn new(
        repo: Arc<dyn BotRepository>,
        registry: ProviderRegistry,
        handler: Arc<MessageHandler>,
    ) -> Self {
        Self {
            repo,
            registry,
            handler,
            instances: RwLock::new(HashMap::new()),
            lifecycle_locks: Mutex::new(HashMap::new()),
            restart_delay: RESTART_DELAY,
        }
    }

    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn handler(&self) -> &Arc<MessageHandler> {
        &self.handler
    }

    /// Whether bots on `platform` can be started by this manager.
    pub fn supports(&self, platform: Platform) -> bool {
        self.registry.supports(platform)
    }

    async fn lock_lifecycle(&self, bot_id: &str) -> LifecycleGuard<'_> {
        let lock = self
            .lifecycle_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bot_id.to_string())
            .or_default()
            .clone();
        LifecycleGuard {
            locks: &self.lifecycle_locks,
            bot_id: bot_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.lifecycle_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn persist_status(&self, bot_id: &str, status: BotStatus, error: Option<&str>) {
        if let Err(e) = self.repo.update_bot_status(bot_id, status, error).await {
            warn!("failed to persist status {} for bot {}: {}", status, bot_id, e);
        }
    }

    /// Start every bot persisted as ONLINE or STARTING. Individual failures
    /// are recorded on the bot and never abort the rest. Returns how many
    /// bots are running afterwards.
    pub async fn load_from_persistence(&self) -> BizbotResult<usize> {
        let bots = self.repo.list_bots_by_status(&RESUMABLE).await?;
        info!("resuming {} bot(s) from persistence", bots.len());

        let results = join_all(bots.iter().map(|bot| self.start(&bot.id))).await;
        let mut started = 0;
        for (bot, result) in bots.iter().zip(results) {
            match result {
                Ok(()) => started += 1,
                Err(e) => error!("failed to resume bot {} ({}): {}", bot.id, bot.platform, e),
            }
        }
        info!("{}/{} bot(s) resumed", started, bots.len());
        Ok(started)
    }

    pub async fn start(&self, bot_id: &str) -> BizbotResult<()> {
        let _guard = self.lock_lifecycle(bot_id).await;

        if self.instances.read().await.contains_key(bot_id) {
            warn!("bot {} is already running", bot_id);
            return Ok(());
        }

        let bot = self
            .repo
            .get_bot(bot_id)
            .await?
            .ok_or_else(|| BizbotError::NotFound(format!("bot {}", bot_id)))?;

        info!("starting {} bot {}", bot.platform, bot.id);
        self.persist_status(bot_id, BotStatus::Starting, None).await;

        match self.launch(&bot).await {
            Ok(provider) => {
                self.instances
                    .write()
                    .await
                    .insert(bot_id.to_string(), provider);
                self.persist_status(bot_id, BotStatus::Online, None).await;
                info!("bot {} online", bot_id);
                Ok(())
            }
            Err(e) => {
                let text = e.to_string();
                error!("bot {} failed to start: {}", bot_id, text);
                self.persist_status(bot_id, BotStatus::Error, Some(&text))
                    .await;
                Err(e)
            }
        }
    }

    async fn launch(&self, bot: &Bot) -> BizbotResult<Arc<dyn MessagingProvider>> {
        let provider = self.registry.build(bot)?;

        // Weak so the provider's own handler list does not keep it alive
        let weak = Arc::downgrade(&provider);
        let handler = self.handler.clone();
        let bot_id = bot.id.clone();
        provider.on_message(message_callback(move |message| {
            let handler = handler.clone();
            let weak = weak.clone();
            let bot_id = bot_id.clone();
            async move {
                let reply = handler.handle(&message).await;
                if reply.trim().is_empty() {
                    return Ok(());
                }
                let Some(provider) = weak.upgrade() else {
                    debug!("bot {} stopped before reply was sent", bot_id);
                    return Ok(());
                };
                if !provider.send_message(&message.chat_id, &reply).await {
                    anyhow::bail!("bot {} could not deliver reply to {}", bot_id, message.chat_id);
                }
                Ok(())
            }
        }));

        if let Err(e) = provider.initialize().await {
            if let Err(stop_err) = provider.stop().await {
                debug!("cleanup after failed start of {}: {}", bot.id, stop_err);
            }
            return Err(BizbotError::channel(
                bot.platform.as_str(),
                format!("{:#}", e),
            ));
        }

        if let Some(name) = provider.account_name()
            && bot.username.as_deref() != Some(name.as_str())
        {
            let update = BotUpdate {
                username: Some(name),
                ..BotUpdate::default()
            };
            if let Err(e) = self.repo.update_bot(&bot.id, update).await {
                warn!("failed to store username for bot {}: {}", bot.id, e);
            }
        }

        Ok(provider)
    }

    pub async fn stop(&self, bot_id: &str) -> BizbotResult<()> {
        let _guard = self.lock_lifecycle(bot_id).await;
        self.stop_locked(bot_id).await
    }

    /// Stop the bot if it runs, then delete its record, all under one
    /// lifecycle lock so no concurrent `start` can slip in between. A failing
    /// stop is logged and the delete still happens. Returns whether a record
    /// was deleted.
    pub async fn remove(&self, bot_id: &str) -> BizbotResult<bool> {
        let _guard = self.lock_lifecycle(bot_id).await;
        if let Err(e) = self.stop_locked(bot_id).await {
            warn!("could not stop bot {} before delete: {}", bot_id, e);
        }
        let deleted = self.repo.delete_bot(bot_id).await?;
        if deleted {
            info!("deleted bot {}", bot_id);
        }
        Ok(deleted)
    }

    async fn stop_locked(&self, bot_id: &str) -> BizbotResult<()> {
        // Removed before calling the provider so a failing stop leaves no ghost entry
        let Some(provider) = self.instances.write().await.remove(bot_id) else {
            warn!("bot {} is not running", bot_id);
            return Ok(());
        };

        info!("stopping bot {}", bot_id);
        self.persist_status(bot_id, BotStatus::Stopping, None).await;
        match provider.stop().await {
            Ok(()) => {
                self.persist_status(bot_id, BotStatus::Offline, None).await;
                info!("bot {} offline", bot_id);
                Ok(())
            }
            Err(e) => {
                let err = BizbotError::channel(provider.platform().as_str(), format!("{:#}", e));
                let text = err.to_string();
                error!("bot {} failed to stop cleanly: {}", bot_id, text);
                self.persist_status(bot_id, BotStatus::Error, Some(&text))
                    .await;
                Err(err)
            }
        }
    }

    pub async fn restart(&self, bot_id: &str) -> BizbotResult<()> {
        self.stop(bot_id).await?;
        tokio::time::sleep(self.restart_delay).await;
        self.start(bot_id).await
    }

    pub async fn stop_all(&self) {
        let ids = self.active_bots().await;
        if ids.is_empty() {
            return;
        }
        info!("stopping {} bot(s)", ids.len());
        let results = join_all(ids.iter().map(|id| self.stop(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                error!("failed to stop bot {}: {}", id, e);
            }
        }
    }

    /// Hand a raw webhook body to the running provider for `bot_id`.
    /// Payloads for bots that are not running are dropped.
    pub async fn route_webhook_payload(
        &self,
        bot_id: &str,
        payload: serde_json::Value,
    ) -> BizbotResult<()> {
        let provider = self.instances.read().await.get(bot_id).cloned();
        let Some(provider) = provider else {
            warn!("dropping webhook payload for inactive bot {}", bot_id);
            return Ok(());
        };
        provider
            .handle_webhook_payload(payload)
            .await
            .map_err(|e| BizbotError::channel(provider.platform().as_str(), format!("{:#}", e)))
    }

    /// Persisted status; OFFLINE for unknown bots.
    pub async fn status(&self, bot_id: &str) -> BizbotResult<BotStatus> {
        Ok(self
            .repo
            .get_bot(bot_id)
            .await?
            .map_or(BotStatus::Offline, |b| b.status))
    }

    pub async fn is_running(&self, bot_id: &str) -> bool {
        self.instances.read().await.contains_key(bot_id)
    }

    pub async fn active_bots(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
