use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::ingestion::IngestError;
use crate::pricing::PricingError;
use crate::query::QueryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(config::ConfigError),
    Database(DatabaseError),
    Pricing(PricingError),
    Auth(AuthError),
    Ingest(IngestError),
    Query(QueryError),
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "Configuration error: {}", err),
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::Pricing(err) => write!(f, "Pricing error: {}", err),
            AppError::Auth(err) => write!(f, "{}", err),
            AppError::Ingest(err) => write!(f, "{}", err),
            AppError::Query(err) => write!(f, "{}", err),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        AppError::Pricing(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        AppError::Ingest(err)
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        AppError::Query(err)
    }
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AppError::Database(DatabaseError::NotFound) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Pricing(PricingError::UnknownModel(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unknown_model")
            }
            AppError::Pricing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "pricing_error"),
            AppError::Auth(AuthError::InvalidKey) => (StatusCode::UNAUTHORIZED, "invalid_api_key"),
            AppError::Auth(AuthError::RevokedKey) => (StatusCode::UNAUTHORIZED, "revoked_api_key"),
            AppError::Auth(AuthError::Database(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
            AppError::Ingest(err) => match err.root() {
                IngestError::UnknownModel(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unknown_model"),
                IngestError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
                IngestError::InconsistentCost(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "inconsistent_cost")
                }
                IngestError::UnknownCustomer(_) => (StatusCode::NOT_FOUND, "unknown_customer"),
                IngestError::AggregationFailure(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "aggregation_failure")
                }
                IngestError::Database(_) | IngestError::InBatch { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            },
            AppError::Query(QueryError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            AppError::Query(QueryError::InvalidCursor(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_cursor")
            }
            AppError::Query(QueryError::Timeout(_)) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            AppError::Query(QueryError::Database(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_and_kind().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        // Server-side failures keep their detail in the logs only
        let message = if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "error": kind,
            "message": message
        });
        if let AppError::Ingest(IngestError::InBatch { index, .. }) = &self {
            body["index"] = json!(index);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let config_err = AppError::Config(config::ConfigError::NotFound("test".to_string()));
        assert!(config_err.to_string().contains("Configuration error"));

        let internal_err = AppError::Internal("test message".to_string());
        assert_eq!(internal_err.to_string(), "Internal error: test message");

        let unauthorized_err = AppError::Unauthorized("access denied".to_string());
        assert_eq!(unauthorized_err.to_string(), "Unauthorized: access denied");

        let auth_err = AppError::from(AuthError::RevokedKey);
        assert_eq!(auth_err.to_string(), "API key has been revoked");
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                AppError::from(IngestError::UnknownModel("gpt-9".to_string())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::from(IngestError::Validation("bad".to_string())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::from(IngestError::UnknownCustomer(Uuid::nil())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(IngestError::AggregationFailure("boom".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::from(AuthError::InvalidKey), StatusCode::UNAUTHORIZED),
            (AppError::from(AuthError::RevokedKey), StatusCode::UNAUTHORIZED),
            (
                AppError::from(QueryError::InvalidCursor("x".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::from(QueryError::Timeout(10)), StatusCode::GATEWAY_TIMEOUT),
            (
                AppError::from(DatabaseError::NotFound),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{}", error);
        }
    }

    #[tokio::test]
    async fn test_batch_error_reports_index() {
        let error = AppError::from(IngestError::InBatch {
            index: 3,
            source: Box::new(IngestError::UnknownModel("gpt-9".to_string())),
        });

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "unknown_model");
        assert_eq!(body["index"], 3);
        assert!(body["message"].as_str().unwrap().contains("gpt-9"));
    }

    #[tokio::test]
    async fn test_server_errors_hide_detail() {
        let response = AppError::Database(DatabaseError::Database(
            "connection refused at 10.0.0.1".to_string(),
        ))
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "database_error");
        assert_eq!(body["message"], "Internal server error");
    }
}
