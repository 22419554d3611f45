use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult,
    backend::{Backend, BackendError},
    models::User,
};

pub const USER_ID: &str = "user_id";

/// The current identity, resolved once per request and handed to every
/// operation that needs it.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    user: Option<User>,
}

impl AuthContext {
    pub fn anonymous() -> AuthContext {
        AuthContext { user: None }
    }

    pub fn signed_in(user: User) -> AuthContext {
        AuthContext { user: Some(user) }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn require(&self) -> Result<&User, BackendError> {
        self.user.as_ref().ok_or(BackendError::AuthRequired)
    }

    /// Looks up the identity stored in the session. A stale id (user gone)
    /// resolves to anonymous.
    pub async fn resolve<B: Backend>(session: &Session, backend: &B) -> AppResult<AuthContext> {
        let Some(user_id) = session.get::<Uuid>(USER_ID).await? else {
            return Ok(AuthContext::anonymous());
        };

        let user = backend.user(user_id).await?;
        if user.is_none() {
            tracing::warn!(%user_id, "session refers to unknown user");
        }
        Ok(AuthContext { user })
    }

    pub async fn establish(session: &Session, user: User) -> AppResult<AuthContext> {
        session.cycle_id().await?;
        session.insert(USER_ID, user.id).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "signed in");
        Ok(AuthContext::signed_in(user))
    }

    pub async fn tear_down(self, session: &Session) -> AppResult<()> {
        session.flush().await?;
        if let Some(user) = self.user {
            tracing::info!(user_id = %user.id, "signed out");
        }
        Ok(())
    }
}
