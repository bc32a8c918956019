use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub last_login: Option<OffsetDateTime>,
}

/// Failure modes of [`User::create`]. A duplicate username is an expected
/// outcome and must stay distinguishable from a storage fault.
#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("username already exists")]
    DuplicateUsername,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl User {
    /// Find a user by username.
    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT username, password_hash, last_login
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with an already-hashed password.
    pub async fn create(
        db: &PgPool,
        username: &str,
        password_hash: &str,
    ) -> Result<User, CreateUserError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING username, password_hash, last_login
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                Err(CreateUserError::DuplicateUsername)
            }
            Err(e) => Err(CreateUserError::Database(e)),
        }
    }

    /// Stamp the current time into `last_login`.
    pub async fn touch_last_login(db: &PgPool, username: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users SET last_login = now() WHERE username = $1
            "#,
        )
        .bind(username)
        .execute(db)
        .await?;
        Ok(())
    }
}
