use axum::{debug_handler, extract::State, response::Redirect};
use tower_sessions::Session;

use crate::{AppResult, backend::SqliteBackend, session::AuthContext};

/// Ends the session; the gate at `/` then shows the login page.
#[debug_handler]
pub(crate) async fn logout(
    State(backend): State<SqliteBackend>,
    session: Session,
) -> AppResult<Redirect> {
    AuthContext::resolve(&session, &backend)
        .await?
        .tear_down(&session)
        .await?;
    Ok(Redirect::to("/"))
}
