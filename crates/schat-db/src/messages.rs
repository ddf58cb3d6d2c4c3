use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::{FromRow, Row};

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, content, status, created_at";

/// Ranks the stored status text so updates can refuse to move backwards.
const STATUS_RANK_SQL: &str =
    "CASE status WHEN 'sent' THEN 0 WHEN 'delivered' THEN 1 WHEN 'read' THEN 2 ELSE 0 END";

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, AnyRow> for MessageRow {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            status: row.try_get("status")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

/// A message joined with the public fields of its sender.
#[derive(Debug, Clone)]
pub struct MessageWithSenderRow {
    pub message: MessageRow,
    pub sender_full_name: String,
    pub sender_schat_id: String,
    pub sender_profile_image_url: Option<String>,
}

impl<'r> FromRow<'r, AnyRow> for MessageWithSenderRow {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            message: MessageRow::from_row(row)?,
            sender_full_name: row.try_get("sender_full_name")?,
            sender_schat_id: row.try_get("sender_schat_id")?,
            sender_profile_image_url: row.try_get("sender_profile_image_url")?,
        })
    }
}

/// Insert a message and bump the chat's activity timestamp in one
/// transaction.
pub async fn create_message(
    pool: &DbPool,
    chat_id: i64,
    sender_id: i64,
    content: &str,
    status: &str,
) -> Result<MessageRow, DbError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "INSERT INTO messages (chat_id, sender_id, content, status, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(chat_id)
    .bind(sender_id)
    .bind(content)
    .bind(status)
    .bind(datetime_to_db_text(now))
    .fetch_one(&mut *tx)
    .await?;

    crate::chats::touch_chat(&mut *tx, chat_id, now).await?;
    tx.commit().await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Full history of a chat, oldest first, with sender profiles attached.
pub async fn get_chat_messages(
    pool: &DbPool,
    chat_id: i64,
) -> Result<Vec<MessageWithSenderRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageWithSenderRow>(
        "SELECT m.id, m.chat_id, m.sender_id, m.content, m.status, m.created_at,
                u.full_name AS sender_full_name,
                u.schat_id AS sender_schat_id,
                u.profile_image_url AS sender_profile_image_url
         FROM messages m
         INNER JOIN users u ON u.id = m.sender_id
         WHERE m.chat_id = $1
         ORDER BY m.id ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_last_message(pool: &DbPool, chat_id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = $1 ORDER BY id DESC LIMIT 1"
    ))
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Move a message to `status` only when that is a forward step.
/// Returns whether the row changed.
pub async fn advance_message_status(
    pool: &DbPool,
    id: i64,
    status: &str,
    status_rank: i32,
) -> Result<bool, DbError> {
    let result = sqlx::query(&format!(
        "UPDATE messages SET status = $1 WHERE id = $2 AND {STATUS_RANK_SQL} < $3"
    ))
    .bind(status)
    .bind(id)
    .bind(status_rank)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Advance every `sent` message in the chat that `recipient_id` did not author.
pub async fn mark_chat_delivered(
    pool: &DbPool,
    chat_id: i64,
    recipient_id: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE messages SET status = 'delivered'
         WHERE chat_id = $1 AND sender_id <> $2 AND status = 'sent'",
    )
    .bind(chat_id)
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
