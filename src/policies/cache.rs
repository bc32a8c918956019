use std::borrow::Cow;
use std::future::Future;

use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::policies::repo::Policy;

/// Longest slice of a single policy document included in the prompt.
pub const PREVIEW_CHARS: usize = 500;
pub const SEPARATOR: &str = "\n\n---\n\n";

/// Memoized concatenation of all policy documents. Owned by `AppState`
/// and computed at most once until explicitly invalidated; the composed
/// text stays stale across policy edits until `refresh` is called.
#[derive(Default)]
pub struct PolicyCache {
    text: RwLock<Option<String>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The composed policy text, loading it on first access.
    pub async fn get_or_load(&self, db: &PgPool) -> anyhow::Result<String> {
        self.get_or_try_init(|| async { Policy::list_all(db).await })
            .await
    }

    pub async fn get_or_try_init<F, Fut>(&self, load: F) -> anyhow::Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<Policy>>>,
    {
        if let Some(text) = self.text.read().await.as_ref() {
            return Ok(text.clone());
        }

        let policies = load().await?;
        let composed = compose(&policies);
        info!(policies = policies.len(), chars = composed.len(), "policy cache loaded");

        // Concurrent first accesses may both get here; the compositions
        // come from the same rows, so last write wins harmlessly.
        let mut guard = self.text.write().await;
        *guard = Some(composed.clone());
        Ok(composed)
    }

    pub async fn invalidate(&self) {
        debug!("policy cache invalidated");
        *self.text.write().await = None;
    }

    /// Drop the memoized text and recompute from the current rows.
    pub async fn refresh(&self, db: &PgPool) -> anyhow::Result<String> {
        self.invalidate().await;
        self.get_or_load(db).await
    }
}

pub fn compose(policies: &[Policy]) -> String {
    policies
        .iter()
        .map(|p| preview(&p.content))
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

fn preview(content: &str) -> Cow<'_, str> {
    // nth char's byte offset keeps the cut on a char boundary
    match content.char_indices().nth(PREVIEW_CHARS) {
        None => Cow::Borrowed(content),
        Some((idx, _)) => Cow::Owned(format!("{}...", &content[..idx])),
    }
}
