//! Axum Handlers for the REST API
//!
//! `POST /api/ra` forwards an SSML document to the shared synthesis session and
//! answers with the audio. `GET /api/formats` lists the supported formats.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use readaloud_core::{OutputFormat, SynthesisError};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{ErrorResponse, FormatList},
    state::AppState,
};

/// Request header selecting the output format.
pub const FORMAT_HEADER: &str = "format";

pub enum ApiError {
    BadRequest(String),
    BadGateway(String),
    GatewayTimeout(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::GatewayTimeout(message) => {
                (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<SynthesisError> for ApiError {
    fn from(err: SynthesisError) -> Self {
        match err {
            SynthesisError::Timeout => Self::GatewayTimeout(err.to_string()),
            SynthesisError::Connection(_) | SynthesisError::ConnectionClosed(_) => {
                Self::BadGateway(err.to_string())
            }
            SynthesisError::DuplicateRequest(_) | SynthesisError::SessionClosed => {
                Self::InternalServerError(err.into())
            }
        }
    }
}

/// Synthesize the SSML document in the request body.
pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    let format = match headers.get(FORMAT_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| ApiError::BadRequest("Format header must be plain text".to_string()))?
            .parse::<OutputFormat>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => state.config.default_format,
    };

    if body.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "request body must be an SSML document".to_string(),
        ));
    }

    let audio = state.session.convert(&body, format).await.inspect_err(|e| {
        warn!(format = %format, error = %e, "synthesis failed");
    })?;
    info!(format = %format, bytes = audio.len(), "synthesis complete");

    Ok(([(header::CONTENT_TYPE, format.content_type())], audio).into_response())
}

/// List every supported output format with its content type.
pub async fn list_formats() -> Json<FormatList> {
    Json(
        OutputFormat::all()
            .map(|format| (format.as_str(), format.content_type()))
            .collect(),
    )
}
