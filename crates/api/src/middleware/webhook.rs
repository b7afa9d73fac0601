//! Shared-secret check for executor callbacks.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chalops_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the webhook secret.
pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

/// Marker extractor: succeeds when no `WEBHOOK_SECRET` is configured, or
/// when the request's `X-Webhook-Token` equals it.
#[derive(Debug, Clone, Copy)]
pub struct WebhookCaller;

impl FromRequestParts<AppState> for WebhookCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.webhook_secret.as_deref() else {
            return Ok(WebhookCaller);
        };

        let presented = parts
            .headers
            .get(WEBHOOK_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !constant_time_eq(presented.as_bytes(), secret.as_bytes()) {
            tracing::warn!("Webhook rejected: bad or missing token");
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid webhook token".into(),
            )));
        }
        Ok(WebhookCaller)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_whole_value() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(!constant_time_eq(b"", b"secret"));
    }
}
