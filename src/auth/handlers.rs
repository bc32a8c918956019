use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginForm, SignupForm},
        password::{hash_password, verify_password},
        repo::{CreateUserError, User},
        session::{MaybeSessionUser, SessionKeys},
    },
    pages,
    state::AppState,
};

pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page))
        .route("/signup", get(signup_page))
        .route("/logout", get(logout))
}

pub fn form_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/signup", post(signup))
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

#[instrument(skip_all)]
pub async fn login_page(MaybeSessionUser(user): MaybeSessionUser) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    pages::login_page(None).into_response()
}

#[instrument(skip_all)]
pub async fn signup_page(MaybeSessionUser(user): MaybeSessionUser) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    pages::signup_page(None).into_response()
}

#[instrument(skip(state, jar, form))]
pub async fn login(
    State(state): State<AppState>,
    MaybeSessionUser(session): MaybeSessionUser,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if session.is_some() {
        return Redirect::to("/").into_response();
    }

    let user = match User::find_by_username(&state.db, &form.username).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(username = %form.username, "login unknown username");
            return (
                StatusCode::UNAUTHORIZED,
                pages::login_page(Some("Invalid credentials")),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "find_by_username failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::login_page(Some("Something went wrong, try again")),
            )
                .into_response();
        }
    };

    if !verify_password(&form.password, &user.password_hash) {
        warn!(username = %form.username, "login invalid password");
        return (
            StatusCode::UNAUTHORIZED,
            pages::login_page(Some("Invalid credentials")),
        )
            .into_response();
    }

    if let Err(e) = User::touch_last_login(&state.db, &form.username).await {
        error!(error = %e, username = %form.username, "touch_last_login failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            pages::login_page(Some("Something went wrong, try again")),
        )
            .into_response();
    }

    let keys = SessionKeys::from_ref(&state);
    let cookie = match keys.issue_cookie(&form.username) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "session sign failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::login_page(Some("Something went wrong, try again")),
            )
                .into_response();
        }
    };

    info!(username = %form.username, "user logged in");
    (jar.add(cookie), Redirect::to("/")).into_response()
}

#[instrument(skip(state, jar, form))]
pub async fn signup(
    State(state): State<AppState>,
    MaybeSessionUser(session): MaybeSessionUser,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Response {
    if session.is_some() {
        return Redirect::to("/").into_response();
    }

    if form.password != form.confirm_password {
        warn!("signup password mismatch");
        return (
            StatusCode::BAD_REQUEST,
            pages::signup_page(Some("Passwords don't match")),
        )
            .into_response();
    }

    if !is_valid_username(&form.username) {
        warn!(username = %form.username, "invalid username");
        return (
            StatusCode::BAD_REQUEST,
            pages::signup_page(Some("Invalid username")),
        )
            .into_response();
    }

    if let Ok(Some(_)) = User::find_by_username(&state.db, &form.username).await {
        warn!(username = %form.username, "username already registered");
        return (
            StatusCode::BAD_REQUEST,
            pages::signup_page(Some("Username already exists")),
        )
            .into_response();
    }

    let hash = match hash_password(&form.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::signup_page(Some("Registration failed")),
            )
                .into_response();
        }
    };

    let user = match User::create(&state.db, &form.username, &hash).await {
        Ok(u) => u,
        Err(CreateUserError::DuplicateUsername) => {
            // Lost the race against a concurrent signup for the same name.
            warn!(username = %form.username, "duplicate username on insert");
            return (
                StatusCode::BAD_REQUEST,
                pages::signup_page(Some("Username already exists")),
            )
                .into_response();
        }
        Err(CreateUserError::Database(e)) => {
            error!(error = %e, "create user failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::signup_page(Some("Registration failed")),
            )
                .into_response();
        }
    };

    let keys = SessionKeys::from_ref(&state);
    let cookie = match keys.issue_cookie(&user.username) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "session sign failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                pages::signup_page(Some("Registration failed")),
            )
                .into_response();
        }
    };

    info!(username = %user.username, "user registered");
    (jar.add(cookie), Redirect::to("/")).into_response()
}

#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let keys = SessionKeys::from_ref(&state);
    (jar.remove(keys.removal_cookie()), Redirect::to("/login"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("bob.smith_99"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username(".leading-dot"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(&"x".repeat(65)));
    }

    #[tokio::test]
    async fn signup_rejects_password_mismatch_before_storage() {
        // Fake state has a lazy pool; reaching the database would fail,
        // so a 400 here proves validation runs first.
        let state = AppState::fake();
        let form = SignupForm {
            username: "alice".into(),
            password: "one".into(),
            confirm_password: "two".into(),
        };
        let res = signup(
            State(state),
            MaybeSessionUser(None),
            CookieJar::new(),
            Form(form),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authenticated_login_page_redirects_home() {
        let res = login_page(MaybeSessionUser(Some("alice".into()))).await;
        assert!(res.status().is_redirection());
        assert_eq!(res.headers()["location"], "/");
    }

    #[tokio::test]
    async fn authenticated_signup_post_redirects_home() {
        let state = AppState::fake();
        let form = SignupForm {
            username: "alice".into(),
            password: "pw".into(),
            confirm_password: "pw".into(),
        };
        let res = signup(
            State(state),
            MaybeSessionUser(Some("alice".into())),
            CookieJar::new(),
            Form(form),
        )
        .await;
        assert!(res.status().is_redirection());
    }
}
