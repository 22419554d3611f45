use axum::{http::StatusCode, response::{IntoResponse, Response}};

use crate::backend::BackendError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<BackendError>() {
            Some(BackendError::AuthRequired) => StatusCode::UNAUTHORIZED,
            Some(BackendError::NotCreator) => StatusCode::FORBIDDEN,
            Some(BackendError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{:#}", self.0);
            (status, format!("{}\n\n{}", self.0, self.0.backtrace())).into_response()
        } else {
            (status, self.0.to_string()).into_response()
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
