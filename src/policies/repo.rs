use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Policy document. Read-only for this application; the rows are the
/// source of truth for what the assistant may answer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Policy {
    pub id: Uuid,
    pub content: String,
}

impl Policy {
    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Policy>> {
        let rows = sqlx::query_as::<_, Policy>(
            r#"
            SELECT id, content
            FROM policies
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}
