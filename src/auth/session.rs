use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::Redirect,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::state::AppState;

/// Payload signed into the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // username
    pub iat: usize,
    pub exp: usize,
}

/// Signing and verification keys for the session cookie, derived from
/// the configured secret.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub cookie_name: String,
    ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let cfg = &state.config.session;
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            cookie_name: cfg.cookie_name.clone(),
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }
}

impl SessionKeys {
    pub fn sign(&self, username: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            sub: username.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: (now + self.ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(username, "session signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<String> {
        let data = decode::<SessionClaims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims.sub)
    }

    /// Session cookie carrying a freshly signed token for `username`.
    pub fn issue_cookie(&self, username: &str) -> anyhow::Result<Cookie<'static>> {
        let token = self.sign(username)?;
        Ok(Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build())
    }

    /// Expired cookie that clears the session on the client.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::from(self.cookie_name.clone());
        cookie.set_path("/");
        cookie
    }

    /// Username from the request's session cookie, if present and valid.
    fn session_user(&self, parts: &Parts) -> Option<String> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(&self.cookie_name)?.value().to_string();
        match self.verify(&token) {
            Ok(username) => Some(username),
            Err(e) => {
                warn!(error = %e, "invalid session cookie");
                None
            }
        }
    }
}

/// Authenticated session user. Protected pages reject by redirecting
/// to the login page.
pub struct SessionUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        keys.session_user(parts)
            .map(SessionUser)
            .ok_or_else(|| Redirect::to("/login"))
    }
}

/// Session user where authentication is optional.
pub struct MaybeSessionUser(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeSessionUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        Ok(MaybeSessionUser(keys.session_user(parts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;
    use axum::http::Request;

    fn make_keys() -> SessionKeys {
        SessionKeys::from_ref(&AppState::fake())
    }

    fn parts_with_cookie(header: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(COOKIE, h);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let token = keys.sign("alice").expect("sign");
        assert_eq!(keys.verify(&token).expect("verify"), "alice");
    }

    #[tokio::test]
    async fn verify_rejects_tampered_token() {
        let keys = make_keys();
        let mut token = keys.sign("alice").expect("sign");
        token.push('x');
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn issued_cookie_is_http_only_and_lax() {
        let keys = make_keys();
        let cookie = keys.issue_cookie("alice").expect("cookie");
        assert_eq!(cookie.name(), "policybot_session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[tokio::test]
    async fn missing_cookie_redirects_to_login() {
        let state = AppState::fake();
        let mut parts = parts_with_cookie(None);
        let rejection = SessionUser::from_request_parts(&mut parts, &state).await;
        assert!(rejection.is_err());
    }

    #[tokio::test]
    async fn valid_cookie_extracts_username() {
        let state = AppState::fake();
        let keys = make_keys();
        let cookie = keys.issue_cookie("alice").expect("cookie");
        let mut parts =
            parts_with_cookie(Some(format!("{}={}", cookie.name(), cookie.value())));
        let SessionUser(username) = SessionUser::from_request_parts(&mut parts, &state)
            .await
            .expect("extract");
        assert_eq!(username, "alice");
    }

    #[tokio::test]
    async fn maybe_user_is_none_without_cookie() {
        let state = AppState::fake();
        let mut parts = parts_with_cookie(None);
        let MaybeSessionUser(user) = MaybeSessionUser::from_request_parts(&mut parts, &state)
            .await
            .expect("infallible");
        assert!(user.is_none());
    }
}
