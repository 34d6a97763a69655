use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::models::{
    Bot, BotConfig, BotStatus, BotUpdate, Conversation, ConversationStatus, Direction, NewBot,
    NewMessage, StoredMessage, UnifiedUser, UserUpdate,
};
use super::{BotRepository, ConversationStore};
use crate::bus::Platform;
use crate::errors::{BizbotError, BizbotResult};

const BOT_COLUMNS: &str = "id, business_id, platform, bot_token, username, status, config, \
                           error_log, last_active, created_at, updated_at";
const USER_COLUMNS: &str =
    "id, name, platform, platform_user_id, phone, last_location, created_at, updated_at";
const CONVERSATION_COLUMNS: &str = "id, user_id, status, created_at";

/// SQLite-backed store. One connection behind a mutex serializes every
/// operation, which is what makes the find-or-create paths atomic.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;
             PRAGMA foreign_keys=ON;",
        )?;
        Self::with_connection(conn).with_context(|| {
            format!(
                "Failed to initialize database schema at: {}",
                db_path.display()
            )
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> BizbotResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BizbotError::Store(format!("DB lock poisoned: {}", e)))
    }
}

fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bots (
            id TEXT PRIMARY KEY,
            business_id TEXT,
            platform TEXT NOT NULL,
            bot_token TEXT NOT NULL,
            username TEXT,
            status TEXT NOT NULL DEFAULT 'OFFLINE',
            config TEXT NOT NULL DEFAULT '{}',
            error_log TEXT,
            last_active TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bots_platform_status ON bots(platform, status);

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            platform TEXT NOT NULL,
            platform_user_id TEXT NOT NULL,
            phone TEXT,
            last_location TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(platform, platform_user_id)
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_one_active
            ON conversations(user_id) WHERE status = 'ACTIVE';

        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            message_id TEXT NOT NULL,
            content TEXT NOT NULL,
            direction TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id);",
    )?;
    Ok(())
}

fn now_str() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

fn bot_from_row(row: &Row<'_>) -> rusqlite::Result<Bot> {
    let platform: String = row.get(2)?;
    let status: String = row.get(5)?;
    let config: String = row.get(6)?;
    Ok(Bot {
        id: row.get(0)?,
        business_id: row.get(1)?,
        platform: Platform::parse_or_default(&platform),
        bot_token: row.get(3)?,
        username: row.get(4)?,
        status: status.parse().unwrap_or_else(|_| {
            warn!("unknown bot status '{}' in store, treating as OFFLINE", status);
            BotStatus::Offline
        }),
        config: BotConfig::from_json_lenient(&config),
        error_log: row.get(7)?,
        last_active: parse_opt_ts(8, row.get(8)?)?,
        created_at: parse_ts(9, &row.get::<_, String>(9)?)?,
        updated_at: parse_ts(10, &row.get::<_, String>(10)?)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UnifiedUser> {
    let platform: String = row.get(2)?;
    let location: Option<String> = row.get(5)?;
    Ok(UnifiedUser {
        id: row.get(0)?,
        name: row.get(1)?,
        platform: Platform::parse_or_default(&platform),
        platform_user_id: row.get(3)?,
        phone: row.get(4)?,
        last_location: location.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_ts(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_ts(7, &row.get::<_, String>(7)?)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let status: String = row.get(2)?;
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: if status == ConversationStatus::Active.as_str() {
            ConversationStatus::Active
        } else {
            ConversationStatus::Closed
        },
        created_at: parse_ts(3, &row.get::<_, String>(3)?)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let direction: String = row.get(4)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        message_id: row.get(2)?,
        content: row.get(3)?,
        direction: if direction == Direction::Outbound.as_str() {
            Direction::Outbound
        } else {
            Direction::Inbound
        },
        timestamp: parse_ts(5, &row.get::<_, String>(5)?)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn select_bot(conn: &Connection, id: &str) -> rusqlite::Result<Option<Bot>> {
    conn.query_row(
        &format!("SELECT {BOT_COLUMNS} FROM bots WHERE id = ?1"),
        params![id],
        bot_from_row,
    )
    .optional()
}

fn select_user(conn: &Connection, id: &str) -> rusqlite::Result<Option<UnifiedUser>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        user_from_row,
    )
    .optional()
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn upsert_user(
        &self,
        platform: Platform,
        platform_user_id: &str,
        name: &str,
    ) -> BizbotResult<UnifiedUser> {
        let conn = self.lock()?;
        let now = now_str();
        conn.execute(
            "INSERT INTO users (id, name, platform, platform_user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(platform, platform_user_id)
             DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
            params![
                uuid::Uuid::new_v4().to_string(),
                name,
                platform.as_str(),
                platform_user_id,
                now
            ],
        )?;
        let user = conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE platform = ?1 AND platform_user_id = ?2"),
            params![platform.as_str(), platform_user_id],
            user_from_row,
        )?;
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> BizbotResult<Option<UnifiedUser>> {
        let conn = self.lock()?;
        Ok(select_user(&conn, id)?)
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> BizbotResult<UnifiedUser> {
        let conn = self.lock()?;
        let existing = select_user(&conn, id)?
            .ok_or_else(|| BizbotError::NotFound(format!("user {}", id)))?;
        let name = update.name.unwrap_or(existing.name);
        let phone = update.phone.or(existing.phone);
        let location = update
            .last_location
            .or(existing.last_location)
            .map(|v| v.to_string());
        conn.execute(
            "UPDATE users SET name = ?1, phone = ?2, last_location = ?3, updated_at = ?4
             WHERE id = ?5",
            params![name, phone, location, now_str(), id],
        )?;
        select_user(&conn, id)?.ok_or_else(|| BizbotError::NotFound(format!("user {}", id)))
    }

    async fn active_conversation(&self, user_id: &str) -> BizbotResult<Conversation> {
        let conn = self.lock()?;
        let existing = conn
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE user_id = ?1 AND status = 'ACTIVE'
                     ORDER BY created_at LIMIT 1"
                ),
                params![user_id],
                conversation_from_row,
            )
            .optional()?;
        if let Some(conv) = existing {
            return Ok(conv);
        }

        let conv = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            status: ConversationStatus::Active,
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO conversations (id, user_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                conv.id,
                conv.user_id,
                conv.status.as_str(),
                conv.created_at.to_rfc3339()
            ],
        )?;
        debug!("created conversation {} for user {}", conv.id, user_id);
        Ok(conv)
    }

    async fn close_conversation(&self, conversation_id: &str) -> BizbotResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE conversations SET status = 'CLOSED' WHERE id = ?1",
            params![conversation_id],
        )?;
        if changed == 0 {
            return Err(BizbotError::NotFound(format!(
                "conversation {}",
                conversation_id
            )));
        }
        Ok(())
    }

    async fn conversations_for_user(&self, user_id: &str) -> BizbotResult<Vec<Conversation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ?1
             ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map(params![user_id], conversation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> BizbotResult<Vec<StoredMessage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, message_id, content, direction, timestamp
             FROM messages WHERE conversation_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![conversation_id, limit as i64], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn save_exchange(
        &self,
        conversation_id: &str,
        inbound: NewMessage,
        outbound: NewMessage,
    ) -> BizbotResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for msg in [&inbound, &outbound] {
            tx.execute(
                "INSERT INTO messages (conversation_id, message_id, content, direction, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conversation_id,
                    msg.message_id,
                    msg.content,
                    msg.direction.as_str(),
                    msg.timestamp.to_rfc3339()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn message_count(&self, conversation_id: &str) -> BizbotResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl BotRepository for SqliteStore {
    async fn create_bot(&self, bot: NewBot) -> BizbotResult<Bot> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_str();
        let config = serde_json::to_string(&bot.config)
            .map_err(|e| BizbotError::Internal(e.into()))?;
        conn.execute(
            "INSERT INTO bots (id, business_id, platform, bot_token, username, status, config,
                               created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'OFFLINE', ?6, ?7, ?7)",
            params![
                id,
                bot.business_id,
                bot.platform.as_str(),
                bot.bot_token,
                bot.username,
                config,
                now
            ],
        )?;
        select_bot(&conn, &id)?.ok_or_else(|| BizbotError::NotFound(format!("bot {}", id)))
    }

    async fn get_bot(&self, id: &str) -> BizbotResult<Option<Bot>> {
        let conn = self.lock()?;
        Ok(select_bot(&conn, id)?)
    }

    async fn list_bots(&self, platform: Option<Platform>) -> BizbotResult<Vec<Bot>> {
        let conn = self.lock()?;
        let rows = if let Some(platform) = platform {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOT_COLUMNS} FROM bots WHERE platform = ?1 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map(params![platform.as_str()], bot_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOT_COLUMNS} FROM bots ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([], bot_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Ok(rows)
    }

    async fn list_bots_by_status(&self, statuses: &[BotStatus]) -> BizbotResult<Vec<Bot>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE status IN ({}) ORDER BY created_at, rowid",
            placeholders(statuses.len())
        ))?;
        let rows = stmt
            .query_map(params_from_iter(statuses.iter().map(BotStatus::as_str)), bot_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn find_bot_for_platform(
        &self,
        platform: Platform,
        statuses: &[BotStatus],
    ) -> BizbotResult<Option<Bot>> {
        if statuses.is_empty() {
            return Ok(None);
        }
        let conn = self.lock()?;
        let args: Vec<&str> = std::iter::once(platform.as_str())
            .chain(statuses.iter().map(BotStatus::as_str))
            .collect();
        let bot = conn
            .query_row(
                &format!(
                    "SELECT {BOT_COLUMNS} FROM bots WHERE platform = ? AND status IN ({})
                     ORDER BY created_at, rowid LIMIT 1",
                    placeholders(statuses.len())
                ),
                params_from_iter(args),
                bot_from_row,
            )
            .optional()?;
        Ok(bot)
    }

    async fn update_bot(&self, id: &str, update: BotUpdate) -> BizbotResult<Bot> {
        let conn = self.lock()?;
        let existing =
            select_bot(&conn, id)?.ok_or_else(|| BizbotError::NotFound(format!("bot {}", id)))?;
        let config = update.config.unwrap_or(existing.config);
        let config =
            serde_json::to_string(&config).map_err(|e| BizbotError::Internal(e.into()))?;
        conn.execute(
            "UPDATE bots SET business_id = ?1, bot_token = ?2, username = ?3, config = ?4,
                             updated_at = ?5
             WHERE id = ?6",
            params![
                update.business_id.or(existing.business_id),
                update.bot_token.unwrap_or(existing.bot_token),
                update.username.or(existing.username),
                config,
                now_str(),
                id
            ],
        )?;
        select_bot(&conn, id)?.ok_or_else(|| BizbotError::NotFound(format!("bot {}", id)))
    }

    async fn update_bot_status(
        &self,
        id: &str,
        status: BotStatus,
        error: Option<&str>,
    ) -> BizbotResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE bots SET status = ?1, error_log = ?2, updated_at = ?3,
                 last_active = CASE WHEN ?1 = 'ONLINE' THEN ?3 ELSE last_active END
             WHERE id = ?4",
            params![status.as_str(), error, now_str(), id],
        )?;
        if changed == 0 {
            return Err(BizbotError::NotFound(format!("bot {}", id)));
        }
        debug!("bot {} status -> {}", id, status);
        Ok(())
    }

    async fn delete_bot(&self, id: &str) -> BizbotResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM bots WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
