use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use p2p_data::LoadError;
use serde_json::json;
use thiserror::Error;

/// Failure while serving a dashboard request.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Load(error) if error.is_data_error() => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Load(_) => StatusCode::BAD_GATEWAY,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
