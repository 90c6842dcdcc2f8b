//! Push-delivery ingress.
//!
//! Alarms arrive as push deliveries from the subscription: the broker
//! POSTs one envelope per message and reads our HTTP status as the
//! acknowledgment. 2xx acks the delivery; anything else nacks it and
//! the broker redelivers. Acknowledgment is granted once the alarm is
//! handed to the pipeline, not once the watcher has acted on it. A
//! crash between handoff and processing drops that specific update,
//! and the next alarm recovers correctness through the monotonic
//! filter.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::tracing::prelude::*;
use crate::wire::{self, Alarm, Encoding, SCHEMA_ENCODING_ATTRIBUTE};

/// One push delivery.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded payload.
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub message_id: String,
}

#[derive(Clone)]
pub struct IngressState {
    inner: Arc<Inner>,
}

struct Inner {
    settings: Settings,
    pipeline: mpsc::Sender<Alarm>,
    shutdown: CancellationToken,
}

impl IngressState {
    pub fn new(
        settings: Settings,
        pipeline: mpsc::Sender<Alarm>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                pipeline,
                shutdown,
            }),
        }
    }
}

pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/push", post(push))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the ingress until the token is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: IngressState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("start receiving messages");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn push(State(state): State<IngressState>, Json(envelope): Json<PushEnvelope>) -> StatusCode {
    let inner = &state.inner;
    let message_id = envelope.message.message_id.as_str();

    // An absent subscription never matches; the broker names the
    // subscription on every push delivery.
    if !inner.settings.matches_subscription(&envelope.subscription) {
        warn!(
            subscription = %envelope.subscription,
            message_id,
            "delivery for unknown subscription"
        );
        return StatusCode::NOT_FOUND;
    }

    let attribute = envelope
        .message
        .attributes
        .get(SCHEMA_ENCODING_ATTRIBUTE)
        .map(String::as_str)
        .unwrap_or_default();
    let encoding = match Encoding::from_attribute(attribute) {
        Ok(encoding) => encoding,
        Err(err) => {
            warn!(%err, message_id, "nacking delivery");
            return StatusCode::BAD_REQUEST;
        }
    };

    let data = match BASE64.decode(envelope.message.data.as_bytes()) {
        Ok(data) => data,
        Err(err) => {
            warn!(%err, message_id, "delivery payload is not valid base64, nacking");
            return StatusCode::BAD_REQUEST;
        }
    };

    let alarm = match wire::decode(&data, encoding) {
        Ok(alarm) => alarm,
        Err(err) => {
            warn!(%err, message_id, "nacking delivery");
            return StatusCode::BAD_REQUEST;
        }
    };

    // Hand off to the watcher. A full pipeline stalls here, delaying
    // the ack; shutdown aborts the attempt and nacks instead.
    tokio::select! {
        _ = inner.shutdown.cancelled() => {
            warn!(message_id, "shutdown while enqueueing, nacking delivery");
            StatusCode::SERVICE_UNAVAILABLE
        }
        sent = inner.pipeline.send(alarm) => match sent {
            Ok(()) => StatusCode::NO_CONTENT,
            Err(_) => {
                warn!(message_id, "pipeline closed, nacking delivery");
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}
