use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::AppError;
use crate::services::payments::{self, ProviderEvent};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-payment-signature";

pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn validate_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(raw) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&raw).is_ok()
}

// POST /webhook/payments
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let secret = &state.config.payment_webhook_secret;
    if secret.is_empty() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET is empty, accepting payment webhook unverified");
    } else if signature.is_empty() || !validate_signature(secret, signature, &body) {
        tracing::warn!("rejected payment webhook with invalid signature");
        return Err(AppError::InvalidSignature);
    }

    let event: ProviderEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable payment webhook payload");
            return Ok(StatusCode::OK.into_response());
        }
    };
    tracing::info!(intent_id = %event.intent_id(), "incoming payment event");

    let now = state.local_now();
    match state.db() {
        Ok(db) => payments::handle_provider_event(&db, now, &event),
        Err(e) => tracing::error!(error = %e, "payment event dropped"),
    }

    Ok(StatusCode::OK.into_response())
}
