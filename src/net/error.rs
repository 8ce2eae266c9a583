use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::sampler::DeviceError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Device(DeviceError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Device(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
