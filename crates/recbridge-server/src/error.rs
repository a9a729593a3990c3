//! HTTP rendering of the gateway error taxonomy
//!
//! Every handler returns [`ApiError`] on failure; the JSON shape is stable:
//! `{"error": kind, "message": str, "details"?: {...}}`.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use recbridge_core::domain::errors::GatewayError;

/// Wrapper carrying a [`GatewayError`] through axum
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut body = json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });

        if let GatewayError::Upstream { data, .. } = &self.0 {
            if !data.is_null() {
                body["details"] = data.clone();
            }
        }

        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimited { retry_after_secs } = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let response = ApiError(GatewayError::RateLimited {
            retry_after_secs: 60,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["Retry-After"], "60");
    }

    #[test]
    fn test_suspended_maps_to_403() {
        let response = ApiError(GatewayError::TenantSuspended).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
