use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// One question/answer exchange. Append-only; rows are never updated or
/// deleted by this application.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatRecord {
    pub username: String,
    pub question: String,
    pub answer: String,
    pub timestamp: OffsetDateTime,
}

impl ChatRecord {
    pub async fn insert(
        db: &PgPool,
        username: &str,
        question: &str,
        answer: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_history (username, question, answer)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(username)
        .bind(question)
        .bind(answer)
        .execute(db)
        .await?;
        Ok(())
    }

    /// All exchanges for `username`, newest first.
    pub async fn list_for_user(db: &PgPool, username: &str) -> anyhow::Result<Vec<ChatRecord>> {
        let rows = sqlx::query_as::<_, ChatRecord>(
            r#"
            SELECT username, question, answer, timestamp
            FROM chat_history
            WHERE username = $1
            ORDER BY timestamp DESC
            "#,
        )
        .bind(username)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}
