use axum::{debug_handler, extract::State, response::{Html, IntoResponse, Response}};
use tower_sessions::Session;

use crate::{
    AppResult, auth, backend::SqliteBackend, include_res, res, rooms::RoomDirectory,
    session::AuthContext,
};

/// Directory for signed-in users, login page for everyone else.
#[debug_handler]
pub async fn index(
    State(backend): State<SqliteBackend>,
    session: Session
) -> AppResult<Response> {
    let auth = AuthContext::resolve(&session, &backend).await?;
    let Some(user) = auth.user() else {
        return Ok(
            Html(auth::login_page_html(None))
                .into_response()
        );
    };

    let directory = RoomDirectory::load(&backend).await;

    Ok(
        Html(
            include_res!(str, "/pages/index.html")
                .replace("{username}", &res::escape(&user.username))
                .replace("{room_items}", &directory.render())
        ).into_response()
    )
}
