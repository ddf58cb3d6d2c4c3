use rand::Rng;
use schat_db::{users::UserRow, DbPool};

use crate::auth::{self, AuthError};
use crate::error::CoreError;

pub const SCHAT_ID_PREFIX: &str = "SCHAT_";
const SCHAT_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SCHAT_ID_LEN: usize = 6;
const SCHAT_ID_ATTEMPTS: usize = 8;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_FULL_NAME_LEN: usize = 64;

/// A fresh `SCHAT_XXXXXX` handle. Uniqueness is checked by the caller.
pub fn generate_schat_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SCHAT_ID_LEN)
        .map(|_| SCHAT_ID_ALPHABET[rng.gen_range(0..SCHAT_ID_ALPHABET.len())] as char)
        .collect();
    format!("{SCHAT_ID_PREFIX}{suffix}")
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_signup(email: &str, password: &str, full_name: &str) -> Result<(), CoreError> {
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(CoreError::BadRequest("invalid email address".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let name_len = full_name.trim().chars().count();
    if name_len == 0 || name_len > MAX_FULL_NAME_LEN {
        return Err(CoreError::BadRequest(format!(
            "full name must be 1-{MAX_FULL_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn register_user(
    pool: &DbPool,
    email: &str,
    password: &str,
    full_name: &str,
) -> Result<UserRow, CoreError> {
    let email = normalize_email(email);
    validate_signup(&email, password, full_name)?;

    if schat_db::users::get_user_by_email(pool, &email).await?.is_some() {
        return Err(CoreError::Conflict("email already registered".into()));
    }

    let password_hash = auth::hash_password(password)?;

    let mut schat_id = None;
    for _ in 0..SCHAT_ID_ATTEMPTS {
        let candidate = generate_schat_id();
        if !schat_db::users::schat_id_exists(pool, &candidate).await? {
            schat_id = Some(candidate);
            break;
        }
    }
    let schat_id =
        schat_id.ok_or_else(|| CoreError::Internal("could not allocate a schat id".into()))?;

    match schat_db::users::create_user(pool, &email, &password_hash, full_name.trim(), &schat_id)
        .await
    {
        Ok(row) => {
            tracing::info!(user_id = row.id, schat_id = %row.schat_id, "user registered");
            Ok(row)
        }
        Err(err) if err.is_unique_violation() => {
            Err(CoreError::Conflict("email already registered".into()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Check credentials. Unknown email and wrong password are indistinguishable.
pub async fn authenticate(pool: &DbPool, email: &str, password: &str) -> Result<UserRow, CoreError> {
    let email = normalize_email(email);
    let user = schat_db::users::get_user_by_email(pool, &email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !auth::verify_password(password, &user.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }
    Ok(user)
}

pub async fn get_user(pool: &DbPool, user_id: i64) -> Result<UserRow, CoreError> {
    schat_db::users::get_user_by_id(pool, user_id)
        .await?
        .ok_or(CoreError::NotFound)
}

/// Look another user up by their public handle.
pub async fn find_by_schat_id(
    pool: &DbPool,
    requester_id: i64,
    schat_id: &str,
) -> Result<UserRow, CoreError> {
    let schat_id = schat_id.trim().to_ascii_uppercase();
    let user = schat_db::users::get_user_by_schat_id(pool, &schat_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if user.id == requester_id {
        return Err(CoreError::BadRequest("you cannot search for yourself".into()));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schat_db::{create_pool, run_migrations};

    async fn pool() -> DbPool {
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn schat_ids_have_expected_shape() {
        let id = generate_schat_id();
        assert!(id.starts_with(SCHAT_ID_PREFIX));
        let suffix = &id[SCHAT_ID_PREFIX.len()..];
        assert_eq!(suffix.len(), SCHAT_ID_LEN);
        assert!(suffix
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let pool = pool().await;
        let user = register_user(&pool, " Ada@Example.com ", "secret-pass", "Ada")
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");

        let authed = authenticate(&pool, "ada@example.com", "secret-pass")
            .await
            .unwrap();
        assert_eq!(authed.id, user.id);

        assert!(matches!(
            authenticate(&pool, "ada@example.com", "wrong-pass").await,
            Err(CoreError::Auth(AuthError::InvalidCredentials))
        ));
        assert!(matches!(
            authenticate(&pool, "nobody@example.com", "secret-pass").await,
            Err(CoreError::Auth(AuthError::InvalidCredentials))
        ));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let pool = pool().await;
        register_user(&pool, "ada@example.com", "secret-pass", "Ada")
            .await
            .unwrap();
        assert!(matches!(
            register_user(&pool, "ADA@example.com", "secret-pass", "Ada").await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn signup_input_is_validated() {
        let pool = pool().await;
        for (email, password, name) in [
            ("not-an-email", "secret-pass", "Ada"),
            ("ada@example.com", "short", "Ada"),
            ("ada@example.com", "secret-pass", "   "),
        ] {
            assert!(matches!(
                register_user(&pool, email, password, name).await,
                Err(CoreError::BadRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn search_rejects_self_and_unknown() {
        let pool = pool().await;
        let ada = register_user(&pool, "ada@example.com", "secret-pass", "Ada")
            .await
            .unwrap();
        let bob = register_user(&pool, "bob@example.com", "secret-pass", "Bob")
            .await
            .unwrap();

        let found = find_by_schat_id(&pool, ada.id, &bob.schat_id.to_lowercase())
            .await
            .unwrap();
        assert_eq!(found.id, bob.id);
        assert!(matches!(
            find_by_schat_id(&pool, ada.id, &ada.schat_id).await,
            Err(CoreError::BadRequest(_))
        ));
        assert!(matches!(
            find_by_schat_id(&pool, ada.id, "SCHAT_NOPE00").await,
            Err(CoreError::NotFound)
        ));
    }
}
