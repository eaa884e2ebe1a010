use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use relay_core::{
    context::{approx_tokens, ContextStore, ResetMode, Turn},
    domain::UserId,
    errors::Error,
    model::types::Speaker,
    Result,
};

use crate::pool::connect;

fn storage_err(e: sqlx::Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

/// Turn log persisted in SQLite.
#[derive(Clone, Debug)]
pub struct SqliteContextStore {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct TurnRow {
    id: i64,
    user_id: i64,
    role: String,
    text: String,
    tokens: i64,
    archived: bool,
    /// Microseconds since the Unix epoch.
    created_at: i64,
}

impl TryFrom<TurnRow> for Turn {
    type Error = Error;

    fn try_from(row: TurnRow) -> Result<Self> {
        let created_at = DateTime::<Utc>::from_timestamp_micros(row.created_at).ok_or_else(|| {
            Error::StorageUnavailable(format!(
                "turn {} has an invalid timestamp: {}",
                row.id, row.created_at
            ))
        })?;

        Ok(Turn {
            id: row.id,
            user_id: UserId(row.user_id),
            role: row.role.parse()?,
            approx_tokens: u32::try_from(row.tokens.max(0)).unwrap_or(u32::MAX),
            text: row.text,
            created_at,
            archived: row.archived,
        })
    }
}

impl SqliteContextStore {
    /// Connect to `database_url` and create the schema if needed.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = connect(database_url).await.map_err(storage_err)?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        info!("Creating turn table if not exist");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                tokens INTEGER NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_user_created ON turns (user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn append(&self, user_id: UserId, role: Speaker, text: &str) -> Result<Turn> {
        let tokens = approx_tokens(text);

        // Never older than the user's latest turn, even if the clock stepped back.
        let (id, created_at): (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO turns (user_id, role, text, tokens, archived, created_at)
            VALUES (?, ?, ?, ?, 0, MAX(?, COALESCE(
                (SELECT MAX(created_at) FROM turns WHERE user_id = ?), 0)))
            RETURNING id, created_at
            "#,
        )
        .bind(user_id.0)
        .bind(role.as_str())
        .bind(text)
        .bind(i64::from(tokens))
        .bind(Utc::now().timestamp_micros())
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        let created_at = DateTime::<Utc>::from_timestamp_micros(created_at).ok_or_else(|| {
            Error::StorageUnavailable(format!("turn {id} has an invalid timestamp: {created_at}"))
        })?;
        debug!(%user_id, id, %role, tokens, "stored turn");

        Ok(Turn {
            id,
            user_id,
            role,
            text: text.to_string(),
            approx_tokens: tokens,
            created_at,
            archived: false,
        })
    }

    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<Turn>> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, role, text, tokens, archived, created_at
            FROM turns
            WHERE user_id = ? AND archived = 0
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter().map(Turn::try_from).collect()
    }

    async fn reset(&self, user_id: UserId, mode: ResetMode) -> Result<u64> {
        let sql = match mode {
            ResetMode::Hard => "DELETE FROM turns WHERE user_id = ?",
            ResetMode::Soft => "UPDATE turns SET archived = 1 WHERE user_id = ?",
        };

        let result = sqlx::query(sql)
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(result.rows_affected())
    }

    async fn count(&self, user_id: UserId, include_archived: bool) -> Result<u64> {
        let (n,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM turns WHERE user_id = ? AND (? OR archived = 0)")
                .bind(user_id.0)
                .bind(include_archived)
                .fetch_one(&self.pool)
                .await
                .map_err(storage_err)?;

        Ok(n.max(0) as u64)
    }
}
