use axum::{response::Html, routing::get, Router};
use time::macros::format_description;
use tracing::instrument;

use crate::auth::session::SessionUser;
use crate::chat::repo::ChatRecord;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(home))
}

#[instrument(skip_all)]
pub async fn home(SessionUser(username): SessionUser) -> Html<String> {
    home_page(&username)
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title} - Policybot</title></head>\n<body>\n{body}\n</body>\n</html>\n"
    ))
}

fn error_banner(error: Option<&str>) -> String {
    match error {
        Some(msg) => format!("<p class=\"error\">{}</p>\n", escape(msg)),
        None => String::new(),
    }
}

pub fn home_page(username: &str) -> Html<String> {
    let username = escape(username);
    layout(
        "Home",
        &format!(
            "<h1>Welcome, {username}</h1>\n\
             <nav><a href=\"/history\">Chat history</a> | <a href=\"/logout\">Log out</a></nav>\n\
             <form id=\"chat\" onsubmit=\"return false\">\n\
             <input id=\"message\" name=\"message\" placeholder=\"Ask about a policy\">\n\
             <button type=\"submit\">Send</button>\n\
             </form>\n\
             <div id=\"replies\"></div>"
        ),
    )
}

pub fn login_page(error: Option<&str>) -> Html<String> {
    layout(
        "Log in",
        &format!(
            "<h1>Log in</h1>\n{}\
             <form method=\"post\" action=\"/login\">\n\
             <input name=\"username\" placeholder=\"Username\" required>\n\
             <input name=\"password\" type=\"password\" placeholder=\"Password\" required>\n\
             <button type=\"submit\">Log in</button>\n\
             </form>\n\
             <p><a href=\"/signup\">Create an account</a></p>",
            error_banner(error)
        ),
    )
}

pub fn signup_page(error: Option<&str>) -> Html<String> {
    layout(
        "Sign up",
        &format!(
            "<h1>Sign up</h1>\n{}\
             <form method=\"post\" action=\"/signup\">\n\
             <input name=\"username\" placeholder=\"Username\" required>\n\
             <input name=\"password\" type=\"password\" placeholder=\"Password\" required>\n\
             <input name=\"confirm_password\" type=\"password\" placeholder=\"Confirm password\" required>\n\
             <button type=\"submit\">Sign up</button>\n\
             </form>\n\
             <p><a href=\"/login\">Already registered?</a></p>",
            error_banner(error)
        ),
    )
}

pub fn history_page(username: &str, records: &[ChatRecord]) -> Html<String> {
    let ts_format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let mut items = String::new();
    for record in records {
        let when = record.timestamp.format(ts_format).unwrap_or_default();
        items.push_str(&format!(
            "<li><time>{when}</time>\n\
             <p class=\"question\">{}</p>\n\
             <p class=\"answer\">{}</p></li>\n",
            escape(&record.question),
            escape(&record.answer),
        ));
    }
    layout(
        "Chat history",
        &format!(
            "<h1>Chat history for {}</h1>\n\
             <nav><a href=\"/\">Home</a></nav>\n\
             <ol>\n{items}</ol>",
            escape(username)
        ),
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
