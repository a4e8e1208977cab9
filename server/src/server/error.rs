//! API error kinds and their HTTP mapping

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::mask::{MaskError, SelectionError};
use crate::oracle::OracleError;
use crate::paint::PaintError;
use crate::results::ResultsError;
use crate::session::SessionError;

use super::upload::UploadError;

/// Every failure a client can observe
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    DecodeError(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    UpstreamError(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::DecodeError(_) => "decode_error",
            Self::Timeout(_) => "timeout",
            Self::UpstreamError(_) => "upstream_error",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::DecodeError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body: `{ "error": <detail>, "code": <kind> }`
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{} ({})", self, self.code());
        } else {
            tracing::warn!("{} ({})", self, self.code());
        }

        let body = ApiErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// JSON body extractor that reports malformed bodies as [`ApiError::BadRequest`]
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MaskError> for ApiError {
    fn from(e: MaskError) -> Self {
        match e {
            MaskError::Decode(_) => Self::DecodeError(e.to_string()),
            MaskError::DimensionMismatch { .. } => Self::BadRequest(e.to_string()),
            MaskError::Encode(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self::NotFound(e.to_string())
    }
}

impl From<SelectionError> for ApiError {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::NoMaskAtPoint { .. } => Self::NotFound(e.to_string()),
            SelectionError::Decode { .. } => Self::DecodeError(e.to_string()),
        }
    }
}

impl From<OracleError> for ApiError {
    fn from(e: OracleError) -> Self {
        match e {
            OracleError::Timeout(_) => Self::Timeout(e.to_string()),
            OracleError::Upstream(_)
            | OracleError::Transport(_)
            | OracleError::InvalidResponse(_) => Self::UpstreamError(e.to_string()),
        }
    }
}

impl From<PaintError> for ApiError {
    fn from(e: PaintError) -> Self {
        match e {
            PaintError::InvalidColor(_)
            | PaintError::InvalidOpacity(_)
            | PaintError::MissingMask
            | PaintError::NoLayers => Self::BadRequest(e.to_string()),
            PaintError::Mask(inner) => inner.into(),
            PaintError::Session(inner) => inner.into(),
            PaintError::Task(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<ResultsError> for ApiError {
    fn from(e: ResultsError) -> Self {
        match e {
            ResultsError::InvalidFilename(_)
            | ResultsError::UnsupportedFormat(_)
            | ResultsError::InvalidQuality(_) => Self::BadRequest(e.to_string()),
            ResultsError::NotFound(_) => Self::NotFound(e.to_string()),
            ResultsError::Encode(inner) => inner.into(),
            ResultsError::Io(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Encode(inner) => inner.into(),
            UploadError::Task(_) => Self::Internal(e.to_string()),
            _ => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Background task failed: {}", e))
    }
}
