use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, instrument, warn};

use crate::{
    auth::session::{MaybeSessionUser, SessionUser},
    chat::{
        dto::{ChatRequest, ChatResponse},
        llm::GenerationError,
        prompt::build_system_prompt,
        repo::ChatRecord,
    },
    pages,
    state::AppState,
};

const APOLOGY: &str = "Sorry, I didn't get a valid response from the model.";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/history", get(history))
}

/// Chat endpoint failures, mapped onto the status codes callers rely on.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message is required")]
    MissingMessage,
    #[error("The bot took too long to respond. Please try again.")]
    Timeout,
    #[error("Failed to communicate with the generation API")]
    Upstream,
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        match self {
            ChatError::MissingMessage => {
                (StatusCode::BAD_REQUEST, Json(json!({ "detail": self.to_string() })))
            }
            // The timeout body goes under "response" so the chat widget
            // renders it like a reply.
            ChatError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "response": self.to_string() })),
            ),
            ChatError::Upstream => {
                (StatusCode::BAD_GATEWAY, Json(json!({ "detail": self.to_string() })))
            }
            ChatError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": self.to_string() })),
            ),
        }
        .into_response()
    }
}

#[instrument(skip(state, body))]
pub async fn chat(
    State(state): State<AppState>,
    MaybeSessionUser(session): MaybeSessionUser,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    let message = match body.message.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => return Err(ChatError::MissingMessage),
    };

    let policies_text = state.policies.get_or_load(&state.db).await.map_err(|e| {
        error!(error = %e, "loading policies failed");
        ChatError::Internal
    })?;
    let system_prompt = build_system_prompt(&policies_text);

    let reply = match state.llm.generate(&system_prompt, &message).await {
        Ok(Some(reply)) => reply,
        Ok(None) => {
            warn!("generation returned no usable text");
            return Ok(Json(ChatResponse {
                response: APOLOGY.into(),
            }));
        }
        Err(GenerationError::Timeout) => {
            warn!("generation request timed out");
            return Err(ChatError::Timeout);
        }
        Err(GenerationError::Transport(e)) => {
            error!(error = %e, "generation transport failure");
            return Err(ChatError::Upstream);
        }
    };

    if let Some(username) = session {
        // The reply is already in hand; a lost history row is logged,
        // not surfaced.
        if let Err(e) = ChatRecord::insert(&state.db, &username, &message, &reply).await {
            error!(error = %e, %username, "failed to save chat history");
        }
    }

    Ok(Json(ChatResponse { response: reply }))
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
) -> Result<Html<String>, (StatusCode, String)> {
    let records = ChatRecord::list_for_user(&state.db, &username)
        .await
        .map_err(|e| {
            error!(error = %e, %username, "list chat history failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load history".into(),
            )
        })?;
    Ok(pages::history_page(&username, &records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::llm::GenerationClient;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use std::sync::Arc;

    struct Stub(Result<Option<String>, fn() -> GenerationError>);

    #[async_trait]
    impl GenerationClient for Stub {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_message: &str,
        ) -> Result<Option<String>, GenerationError> {
            match &self.0 {
                Ok(reply) => Ok(reply.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    async fn state_with(stub: Stub) -> AppState {
        let mut state = AppState::fake();
        state.llm = Arc::new(stub);
        // Seed the cache so handlers never reach the lazy test pool for
        // policy text.
        state
            .policies
            .get_or_try_init(|| async { Ok(vec![]) })
            .await
            .unwrap();
        state
    }

    fn request(message: Option<&str>) -> Json<ChatRequest> {
        Json(ChatRequest {
            message: message.map(str::to_string),
        })
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn reply_is_passed_through() {
        let state = state_with(Stub(Ok(Some("Retain 30 days.".into())))).await;
        let res = chat(
            State(state),
            MaybeSessionUser(None),
            request(Some("What is the retention policy?")),
        )
        .await
        .expect("chat ok");
        assert_eq!(res.0.response, "Retain 30 days.");
    }

    #[tokio::test]
    async fn missing_message_is_bad_request() {
        let state = state_with(Stub(Ok(Some("unused".into())))).await;
        let err = chat(State(state), MaybeSessionUser(None), request(None))
            .await
            .unwrap_err();
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["detail"], "Message is required");
    }

    #[tokio::test]
    async fn blank_message_is_bad_request() {
        let state = state_with(Stub(Ok(Some("unused".into())))).await;
        let err = chat(State(state), MaybeSessionUser(None), request(Some("   ")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn timeout_maps_to_504_with_timeout_body() {
        let state = state_with(Stub(Err(|| GenerationError::Timeout))).await;
        let err = chat(State(state), MaybeSessionUser(None), request(Some("hello")))
            .await
            .unwrap_err();
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = body_json(res).await;
        assert_eq!(
            body["response"],
            "The bot took too long to respond. Please try again."
        );
    }

    #[tokio::test]
    async fn transport_failure_maps_to_502() {
        let state = state_with(Stub(Err(|| {
            GenerationError::Transport("connection refused".into())
        })))
        .await;
        let err = chat(State(state), MaybeSessionUser(None), request(Some("hello")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn empty_reply_yields_apology_with_200() {
        let state = state_with(Stub(Ok(None))).await;
        let res = chat(State(state), MaybeSessionUser(None), request(Some("hello")))
            .await
            .expect("apology is a success response");
        assert_eq!(res.0.response, APOLOGY);
    }

    #[tokio::test]
    async fn failed_history_write_does_not_suppress_reply() {
        // Authenticated session with the unreachable test pool: the
        // insert fails, the reply still comes back.
        let state = state_with(Stub(Ok(Some("Retain 30 days.".into())))).await;
        let res = chat(
            State(state),
            MaybeSessionUser(Some("alice".into())),
            request(Some("What is the retention policy?")),
        )
        .await
        .expect("chat ok despite save failure");
        assert_eq!(res.0.response, "Retain 30 days.");
    }
}
