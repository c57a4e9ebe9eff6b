use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use vigil_core::VigilError;

/// Transport-level error with the stable `{error, detail}` JSON shape
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub detail: String,
}

impl From<VigilError> for ApiError {
    fn from(err: VigilError) -> Self {
        match err {
            VigilError::Validation(detail) => Self {
                status: StatusCode::BAD_REQUEST,
                error: "validation",
                detail,
            },
            VigilError::Unavailable(detail) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                error: "unavailable",
                detail,
            },
            VigilError::Timeout(detail) => Self {
                status: StatusCode::GATEWAY_TIMEOUT,
                error: "timeout",
                detail,
            },
            VigilError::Fatal(detail) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: "fatal",
                detail,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error,
            "detail": self.detail,
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        let e = ApiError::from(VigilError::Validation("bad".into()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e = ApiError::from(VigilError::Unavailable("down".into()));
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);

        let e = ApiError::from(VigilError::Timeout("slow".into()));
        assert_eq!(e.status, StatusCode::GATEWAY_TIMEOUT);

        let e = ApiError::from(VigilError::Fatal("corrupt".into()));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
