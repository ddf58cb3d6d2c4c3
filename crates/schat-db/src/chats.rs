use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: i64,
    pub user1_id: i64,
    pub user2_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ChatRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            user1_id: row.try_get("user1_id")?,
            user2_id: row.try_get("user2_id")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

/// Chats store their pair ordered so `{a, b}` and `{b, a}` hit the same row.
fn ordered_pair(user_a: i64, user_b: i64) -> (i64, i64) {
    if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    }
}

pub async fn find_chat_between(
    pool: &DbPool,
    user_a: i64,
    user_b: i64,
) -> Result<Option<ChatRow>, DbError> {
    let (low, high) = ordered_pair(user_a, user_b);
    let row = sqlx::query_as::<_, ChatRow>(
        "SELECT id, user1_id, user2_id, created_at, updated_at
         FROM chats
         WHERE user1_id = $1 AND user2_id = $2",
    )
    .bind(low)
    .bind(high)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Return the chat for the unordered pair, creating it on first use.
/// Concurrent callers converge on one row through the unique pair index.
pub async fn get_or_create_chat(
    pool: &DbPool,
    user_a: i64,
    user_b: i64,
) -> Result<ChatRow, DbError> {
    if let Some(existing) = find_chat_between(pool, user_a, user_b).await? {
        return Ok(existing);
    }

    let (low, high) = ordered_pair(user_a, user_b);
    let now = datetime_to_db_text(Utc::now());
    sqlx::query(
        "INSERT INTO chats (user1_id, user2_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (user1_id, user2_id) DO NOTHING",
    )
    .bind(low)
    .bind(high)
    .bind(now.clone())
    .bind(now)
    .execute(pool)
    .await?;

    find_chat_between(pool, user_a, user_b)
        .await?
        .ok_or(DbError::NotFound)
}

pub async fn get_chat(pool: &DbPool, chat_id: i64) -> Result<Option<ChatRow>, DbError> {
    let row = sqlx::query_as::<_, ChatRow>(
        "SELECT id, user1_id, user2_id, created_at, updated_at FROM chats WHERE id = $1",
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Chats the user takes part in, most recently active first.
pub async fn list_user_chats(pool: &DbPool, user_id: i64) -> Result<Vec<ChatRow>, DbError> {
    let rows = sqlx::query_as::<_, ChatRow>(
        "SELECT id, user1_id, user2_id, created_at, updated_at
         FROM chats
         WHERE user1_id = $1 OR user2_id = $2
         ORDER BY updated_at DESC, id DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn touch_chat<'e, E>(executor: E, chat_id: i64, at: DateTime<Utc>) -> Result<(), DbError>
where
    E: sqlx::Executor<'e, Database = sqlx::Any>,
{
    sqlx::query("UPDATE chats SET updated_at = $1 WHERE id = $2")
        .bind(datetime_to_db_text(at))
        .bind(chat_id)
        .execute(executor)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{migrated_pool, user};

    #[tokio::test]
    async fn pair_order_does_not_matter() {
        let pool = migrated_pool().await;
        let a = user(&pool, "a@example.com", "SCHAT_AAAAAA").await;
        let b = user(&pool, "b@example.com", "SCHAT_BBBBBB").await;

        let first = get_or_create_chat(&pool, b.id, a.id).await.unwrap();
        let second = get_or_create_chat(&pool, a.id, b.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.user1_id < first.user2_id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn list_orders_by_activity() {
        let pool = migrated_pool().await;
        let a = user(&pool, "a@example.com", "SCHAT_AAAAAA").await;
        let b = user(&pool, "b@example.com", "SCHAT_BBBBBB").await;
        let c = user(&pool, "c@example.com", "SCHAT_CCCCCC").await;

        let with_b = get_or_create_chat(&pool, a.id, b.id).await.unwrap();
        let with_c = get_or_create_chat(&pool, a.id, c.id).await.unwrap();
        touch_chat(&pool, with_b.id, Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();

        let chats = list_user_chats(&pool, a.id).await.unwrap();
        let ids: Vec<i64> = chats.iter().map(|chat| chat.id).collect();
        assert_eq!(ids, vec![with_b.id, with_c.id]);
        assert_eq!(list_user_chats(&pool, c.id).await.unwrap().len(), 1);
        assert!(get_chat(&pool, with_c.id).await.unwrap().is_some());
    }
}
