//! The user-facing JSON web server. Errors of every step of a description
//! request are collected in `DescribeError`, whose `ResponseError` impl is the
//! one place deciding which status code a failure gets.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use tracing::{error, warn};

pub mod protocol;
pub mod routes;

/// Content type of every response body
pub const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Reported instead of the raw failure when upstream errors are not exposed
pub const UPSTREAM_FAILURE: &str = "erreur du service d'inférence";

#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("Content-Type doit être application/json")]
    UnsupportedMediaType,

    #[error("corps de requête trop volumineux")]
    PayloadTooLarge,

    #[error("corps de requête illisible")]
    ReadBody(#[from] actix_web::error::PayloadError),

    #[error("champ 'image_base64' manquant ou invalide")]
    MissingImage,

    #[error("data URL invalide")]
    InvalidDataUrl,

    #[error("base64 invalide")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("{0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("{0:#}")]
    Inference(anyhow::Error),
}

impl actix_web::error::ResponseError for DescribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            DescribeError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DescribeError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            DescribeError::ReadBody(_)
            | DescribeError::MissingImage
            | DescribeError::InvalidDataUrl
            | DescribeError::InvalidBase64(_) => StatusCode::BAD_REQUEST,
            DescribeError::ImageDecode(_) | DescribeError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            DescribeError::InvalidBase64(err) => warn!("rejected request: {self} ({err})"),
            DescribeError::ReadBody(err) => warn!("rejected request: {self} ({err})"),
            _ if status.is_client_error() => warn!("rejected request: {self}"),
            _ => error!("failed to describe image: {self}"),
        }

        json_response(
            status,
            &protocol::ErrorBody {
                error: self.to_string(),
            },
        )
    }
}

/// Serialize `payload` as the response body. Non-ASCII text is written as
/// plain UTF-8, never as `\u` escapes.
pub fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> HttpResponse {
    match serde_json::to_string(payload) {
        Ok(body) => HttpResponse::build(status)
            .content_type(JSON_UTF8)
            .body(body),
        Err(err) => {
            error!("failed to serialize response body: {err}");
            HttpResponse::InternalServerError()
                .content_type(JSON_UTF8)
                .body(r#"{"error":"serialization failed"}"#)
        }
    }
}
