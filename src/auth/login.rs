use axum::{
    Form, debug_handler,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    AppResult,
    backend::{Backend, SqliteBackend},
    include_res, res,
    session::AuthContext,
};

use super::random_alias;

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
}

pub fn login_page_html(error: Option<&str>) -> String {
    let error = match error {
        Some(error) => format!(r#"<div class="error">{}</div>"#, res::escape(error)),
        None => String::new(),
    };
    include_res!(str, "/pages/login.html").replace("{error}", &error)
}

#[debug_handler]
pub(crate) async fn login_page() -> impl IntoResponse {
    Html(login_page_html(None))
}

#[debug_handler]
pub(crate) async fn login(
    State(backend): State<SqliteBackend>,
    session: Session,

    Form(LoginQuery { username, email }): Form<LoginQuery>,
) -> AppResult<Response> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        let page = login_page_html(Some("a valid email is required"));
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response());
    }

    let username = match username.trim() {
        "" => random_alias(),
        name => name.to_owned(),
    };

    let user = backend.sign_in(&username, email).await?;
    AuthContext::establish(&session, user).await?;

    Ok(Redirect::to("/").into_response())
}
