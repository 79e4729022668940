use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::monitor::{ErrorMonitor, DEFAULT_RECENT_LIMIT};
use crate::rate_limit::RateLimiter;
use crate::types::{ErrorLogEntry, PaymentEvent};
use crate::verification;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const WEBHOOK_COMPONENT: &str = "Webhook:payment";

#[derive(Clone)]
pub struct AppState {
    webhook_secret: Arc<str>,
    diagnostics_token: Option<Arc<str>>,
    pub limiter: RateLimiter,
    pub monitor: ErrorMonitor,
    event_tx: mpsc::UnboundedSender<PaymentEvent>,
}

impl AppState {
    /// Build the shared state and the receiving end of the accepted-event queue.
    pub fn new(
        config: &Config,
        monitor: ErrorMonitor,
    ) -> (Self, mpsc::UnboundedReceiver<PaymentEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let state = Self {
            webhook_secret: Arc::from(config.webhook_secret.as_str()),
            diagnostics_token: config.diagnostics_token.as_deref().map(Arc::from),
            limiter: RateLimiter::new(config.rate_limit),
            monitor,
            event_tx,
        };
        (state, event_rx)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/payment", post(handle_payment_webhook))
        .route("/diagnostics/errors", get(list_errors).delete(clear_errors))
        .with_state(state)
}

/// Bind the listener and serve in a background task. Returns the bound address.
pub async fn start(addr: SocketAddr, state: AppState) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "webhook server listening");

    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "webhook server stopped");
        }
    });

    Ok(local_addr)
}

async fn health() -> &'static str {
    "ok"
}

/// Caller identity for rate limiting: first hop of X-Forwarded-For, then X-Real-IP.
///
/// Both headers are client-controlled unless a trusted reverse proxy overwrites
/// them. Deploy behind one that does; otherwise a caller can rotate the header
/// to dodge the limiter and to create a new, never-pruned bucket per value.
pub fn client_identifier(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .unwrap_or("unknown")
        .to_string()
}

async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let identifier = client_identifier(&headers);
    let delivery_id = Uuid::new_v4().to_string();
    let metadata = || {
        let mut m = Map::new();
        m.insert("identifier".into(), Value::String(identifier.clone()));
        m.insert("delivery_id".into(), Value::String(delivery_id.clone()));
        Some(m)
    };

    if !state.limiter.allow(&identifier) {
        state.monitor.log_message(
            WEBHOOK_COMPONENT,
            "rate_limit",
            "webhook rate limit exceeded",
            metadata(),
        );
        return Err(ApiError::RateLimited);
    }

    let signature = match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(sig) => sig,
        None => {
            state.monitor.log_message(
                WEBHOOK_COMPONENT,
                "verify_signature",
                "missing signature header",
                metadata(),
            );
            return Err(ApiError::MissingSignature);
        }
    };

    let payload = match std::str::from_utf8(&body) {
        Ok(p) => p,
        Err(e) => {
            state.monitor.log(WEBHOOK_COMPONENT, "parse_event", &e, metadata());
            return Err(ApiError::InvalidPayload("body is not valid UTF-8".into()));
        }
    };

    if !verification::verify(payload, signature, &state.webhook_secret) {
        state.monitor.log_message(
            WEBHOOK_COMPONENT,
            "verify_signature",
            "webhook signature verification failed",
            metadata(),
        );
        return Err(ApiError::InvalidSignature);
    }

    let event: PaymentEvent = match serde_json::from_str(payload) {
        Ok(ev) => ev,
        Err(e) => {
            state.monitor.log(WEBHOOK_COMPONENT, "parse_event", &e, metadata());
            return Err(ApiError::InvalidPayload(e.to_string()));
        }
    };

    tracing::info!(
        %delivery_id,
        event_id = %event.id,
        event_type = %event.event_type,
        "webhook accepted"
    );

    if state.event_tx.send(event).is_err() {
        state.monitor.log_message(
            WEBHOOK_COMPONENT,
            "forward_event",
            "event consumer is not running",
            metadata(),
        );
        return Err(ApiError::Unavailable);
    }

    Ok(Json(json!({ "received": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorQuery {
    pub limit: Option<usize>,
    pub component: Option<String>,
}

async fn list_errors(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ErrorQuery>,
) -> ApiResult<Json<Vec<ErrorLogEntry>>> {
    authorize(&state, &headers)?;
    let entries = match query.component {
        // With a component, `limit` is optional and keeps only the newest matches.
        Some(component) => {
            let mut matches = state.monitor.by_component(&component);
            if let Some(limit) = query.limit {
                let skip = matches.len().saturating_sub(limit);
                matches.drain(..skip);
            }
            matches
        }
        None => state.monitor.recent(query.limit.unwrap_or(DEFAULT_RECENT_LIMIT)),
    };
    Ok(Json(entries))
}

async fn clear_errors(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    state.monitor.clear();
    tracing::info!("error log cleared");
    Ok(Json(json!({ "cleared": true })))
}

/// Diagnostics are hidden entirely unless a token is configured.
fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let expected = state.diagnostics_token.as_deref().ok_or(ApiError::NotFound)?;
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
