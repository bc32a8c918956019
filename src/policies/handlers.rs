use axum::{extract::State, http::StatusCode, routing::post, Router};
use tracing::{error, instrument};

use crate::auth::session::SessionUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/policies/refresh", post(refresh))
}

/// Recompute the cached policy text from the current rows. Called after
/// policy documents are edited out of band.
#[instrument(skip(state))]
pub async fn refresh(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
) -> Result<StatusCode, (StatusCode, String)> {
    state.policies.refresh(&state.db).await.map_err(|e| {
        error!(error = %e, %username, "policy refresh failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to refresh policies".into(),
        )
    })?;
    Ok(StatusCode::NO_CONTENT)
}
