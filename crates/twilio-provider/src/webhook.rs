//! Webhook server for receiving WhatsApp/SMS messages from Twilio
//!
//! Routes:
//! - `POST /` health check
//! - `POST /webhook` Twilio message callback
//! - `GET /tmp?path=<token>` serves local media handed to Twilio

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, Form, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use reqwest::Client;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::crypto::PathCipher;
use crate::events::{EventBus, ProviderEvent};
use crate::media::EventRef;
use crate::phone::strip_number;
use crate::types::{InboundPayload, NormalizedMessage};

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub bus: EventBus,
    pub cipher: PathCipher,
    pub client: Client,
}

#[derive(Debug, Deserialize)]
struct LocalMediaQuery {
    path: String,
}

/// Create webhook router
pub fn create_webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route("/", post(index_home))
        .route("/webhook", post(incoming_message))
        .route("/tmp", get(local_media))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Turn a raw webhook payload into the framework's message shape
pub fn normalize(payload: &InboundPayload) -> NormalizedMessage {
    let to = strip_number(&payload.to);

    let body = if payload.has_media() {
        payload
            .media_content_type0
            .as_deref()
            .and_then(EventRef::from_content_type)
            .map(|kind| kind.generate())
            .unwrap_or_else(|| payload.body.clone())
    } else if payload.has_location() {
        EventRef::Location.generate()
    } else {
        payload.body.clone()
    };

    NormalizedMessage {
        from: strip_number(&payload.from),
        host: to.clone(),
        to,
        body,
        name: payload.profile_name.clone().unwrap_or_default(),
        raw: payload.fields(),
    }
}

async fn index_home() -> &'static str {
    "running ok"
}

/// Twilio needs a 200 whatever happens, so failures are only logged
async fn incoming_message(
    State(state): State<Arc<WebhookState>>,
    payload: Result<Form<InboundPayload>, FormRejection>,
) -> StatusCode {
    match payload {
        Ok(Form(payload)) => {
            let message = normalize(&payload);
            info!("Received message from {}", message.from);
            debug!("Normalized body: {}", message.body);
            state.bus.emit(ProviderEvent::Message(message));
        }
        Err(e) => {
            warn!("Ignoring undecodable webhook body: {}", e);
        }
    }

    StatusCode::OK
}

async fn local_media(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<LocalMediaQuery>,
) -> Response {
    let target = match state.cipher.open(&query.path) {
        Ok(target) => target,
        Err(e) => {
            warn!("Rejected media request: {}", e);
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    if target.starts_with("http://") || target.starts_with("https://") {
        return proxy_media(&state.client, &target).await;
    }

    let file_path = target.strip_prefix("file://").unwrap_or(&target);
    match tokio::fs::read(file_path).await {
        Ok(bytes) => {
            let content_type = mime_guess::from_path(Path::new(file_path))
                .first_or_octet_stream()
                .to_string();
            debug!("Serving {} ({} bytes)", file_path, bytes.len());
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            warn!("Local media {} unavailable: {}", file_path, e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn proxy_media(client: &Client, url: &str) -> Response {
    let response = match client.get(url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            warn!("Loopback media {} returned {}", url, response.status());
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            warn!("Loopback media {} unreachable: {}", url, e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    match response.bytes().await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type)], bytes.to_vec()).into_response(),
        Err(e) => {
            warn!("Failed to read loopback media {}: {}", url, e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
