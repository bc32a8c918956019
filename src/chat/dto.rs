use serde::{Deserialize, Serialize};

/// Body of `POST /chat`. `message` is optional at the type level so a
/// missing field turns into a 400, not a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}
