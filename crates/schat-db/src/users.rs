use crate::{bool_from_any_row, datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

const USER_COLUMNS: &str = "id, email, password_hash, full_name, schat_id, profile_image_url, \
     status_text, is_online, last_seen, created_at";

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub schat_id: String,
    pub profile_image_url: Option<String>,
    pub status_text: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for UserRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let last_seen_raw: String = row.try_get("last_seen")?;
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            full_name: row.try_get("full_name")?,
            schat_id: row.try_get("schat_id")?,
            profile_image_url: row.try_get("profile_image_url")?,
            status_text: row.try_get("status_text")?,
            is_online: bool_from_any_row(row, "is_online")?,
            last_seen: datetime_from_db_text(&last_seen_raw)?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn create_user(
    pool: &DbPool,
    email: &str,
    password_hash: &str,
    full_name: &str,
    schat_id: &str,
) -> Result<UserRow, DbError> {
    let now = datetime_to_db_text(Utc::now());
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (email, password_hash, full_name, schat_id, is_online, last_seen, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(schat_id)
    .bind(false)
    .bind(now.clone())
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_schat_id(
    pool: &DbPool,
    schat_id: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE schat_id = $1"
    ))
    .bind(schat_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn schat_id_exists(pool: &DbPool, schat_id: &str) -> Result<bool, DbError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE schat_id = $1")
        .bind(schat_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Mirror a presence change. Returns `false` when the user does not exist.
pub async fn update_online_status(
    pool: &DbPool,
    user_id: i64,
    is_online: bool,
    last_seen: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query("UPDATE users SET is_online = $1, last_seen = $2 WHERE id = $3")
        .bind(is_online)
        .bind(datetime_to_db_text(last_seen))
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
