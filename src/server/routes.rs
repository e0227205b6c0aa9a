//! Request handlers. `/describe` validates the body, normalizes the image and
//! forwards it to the inference client; `/health` answers liveness probes.

use super::protocol::{DescriptionBody, HealthBody, IMAGE_FIELD};
use super::{json_response, DescribeError, UPSTREAM_FAILURE};
use crate::config::Settings;
use crate::inference::Describer;
use crate::normalize::{self, NormalizeOptions};
use actix_web::http::{header, StatusCode};
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use anyhow::anyhow;
use base64::{engine::general_purpose, Engine as _};
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

type Result<T> = std::result::Result<T, DescribeError>;

/// Shared by every worker; nothing in it is mutated by requests
pub struct AppState {
    pub describer: Arc<dyn Describer>,
    pub normalize: NormalizeOptions,
    pub expose_upstream_errors: bool,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(describer: Arc<dyn Describer>, settings: &Settings) -> Self {
        AppState {
            describer,
            normalize: settings.into(),
            expose_upstream_errors: settings.expose_upstream_errors,
            max_body_bytes: settings.max_body_bytes,
        }
    }

    fn upstream_error(&self, err: anyhow::Error) -> DescribeError {
        if self.expose_upstream_errors {
            return DescribeError::Inference(err);
        }
        error!("inference failed: {err:#}");
        DescribeError::Inference(anyhow!(UPSTREAM_FAILURE))
    }
}

/// Register the routes on an `App`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(describe).service(health);
}

/// `application/json` or any `application/*+json`, parameters ignored
fn is_json(req: &HttpRequest) -> bool {
    let Some(value) = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// Drop the `data:<type>;base64,` header of a data URL. Anything not starting
/// with `data:` is returned unchanged.
pub fn strip_data_url(image: &str) -> Result<&str> {
    match image.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, payload)| payload)
            .ok_or(DescribeError::InvalidDataUrl),
        None => Ok(image),
    }
}

/// Collect the request body, refusing anything over `limit` bytes
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<web::BytesMut> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(DescribeError::PayloadTooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Decode the image of an already-read `/describe` body
pub fn extract_image(body: &[u8]) -> Result<Vec<u8>> {
    // Unparseable JSON counts as an empty object
    let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let image = value
        .get(IMAGE_FIELD)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(DescribeError::MissingImage)?;

    let payload = strip_data_url(image)?;
    Ok(general_purpose::STANDARD.decode(payload)?)
}

#[post("/describe")]
pub async fn describe(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if !is_json(&req) {
        return Err(DescribeError::UnsupportedMediaType);
    }
    let body = read_body(payload, state.max_body_bytes).await?;
    let raw = extract_image(&body)?;
    debug!("decoded {} image bytes", raw.len());

    let image = normalize::normalize(&raw, state.normalize)?;
    info!(
        "normalized {}x{} image to {}x{} ({} bytes)",
        image.source_width, image.source_height, image.width, image.height, image.bytes
    );

    let description = state
        .describer
        .describe(&image.data_url)
        .await
        .map_err(|err| state.upstream_error(err))?;
    info!("described image in {} chars", description.chars().count());

    Ok(json_response(StatusCode::OK, &DescriptionBody { description }))
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    json_response(StatusCode::OK, &HealthBody { status: "ok" })
}
