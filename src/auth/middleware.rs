use crate::auth::AuthContext;
use crate::error::AppError;
use crate::server::Server;
use crate::utils::request_id::RequestIdExt;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderName, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{trace, warn};

/// Static header name for API key
static X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// API key authentication for every customer-facing route.
///
/// The key is read from `Authorization: Bearer <key>` or `x-api-key`. On success the
/// resolved [`AuthContext`] is added to the request extensions, and to the response
/// extensions for the request logger.
pub async fn api_key_middleware(
    State(server): State<Server>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let request_id = request.extensions().request_id().as_str();

    let presented = if let Some(auth_header) = request.headers().get(AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;
        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".to_string()))?;
        trace!(request_id = %request_id, auth_method = "bearer", "Authenticating request");
        token.trim().to_string()
    } else if let Some(api_key_header) = request.headers().get(&X_API_KEY) {
        let api_key = api_key_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid API key header".to_string()))?;
        trace!(request_id = %request_id, auth_method = "x_api_key", "Authenticating request");
        api_key.trim().to_string()
    } else {
        return Err(AppError::Unauthorized(
            "Missing authentication credentials".to_string(),
        ));
    };

    let context = server.api_keys.validate(&presented).await.map_err(|e| {
        warn!(request_id = %request_id, error = %e, "API key authentication failed");
        AppError::from(e)
    })?;

    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;
    response.extensions_mut().insert(context);
    Ok(response)
}

/// Extracts the [`AuthContext`] set by [`api_key_middleware`]
pub struct CustomerExtractor(pub AuthContext);

impl<S> FromRequestParts<S> for CustomerExtractor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .copied()
            .map(CustomerExtractor)
            .ok_or_else(|| AppError::Unauthorized("Missing customer authentication".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestServerBuilder;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt;

    async fn whoami(CustomerExtractor(context): CustomerExtractor) -> String {
        context.customer_id.to_string()
    }

    fn app(server: &Server) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(
                server.clone(),
                api_key_middleware,
            ))
            .with_state(server.clone())
    }

    async fn body_string(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_key_resolves_customer() {
        let server = TestServerBuilder::new().build().await;
        let customer = server.create_test_customer("bearer@example.com").await;
        let issued = server.issue_test_key(customer.id).await;

        let request = Request::builder()
            .uri("/whoami")
            .header("Authorization", format!("Bearer {}", issued.key))
            .body(Body::empty())
            .unwrap();

        let response = app(&server).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, customer.id.to_string());
    }

    #[tokio::test]
    async fn test_x_api_key_header_resolves_customer() {
        let server = TestServerBuilder::new().build().await;
        let customer = server.create_test_customer("header@example.com").await;
        let issued = server.issue_test_key(customer.id).await;

        let request = Request::builder()
            .uri("/whoami")
            .header("x-api-key", issued.key.as_str())
            .body(Body::empty())
            .unwrap();

        let response = app(&server).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let server = TestServerBuilder::new().build().await;

        let request = Request::builder()
            .uri("/whoami")
            .body(Body::empty())
            .unwrap();

        let response = app(&server).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_non_bearer_authorization_is_rejected() {
        let server = TestServerBuilder::new().build().await;
        let customer = server.create_test_customer("basic@example.com").await;
        let issued = server.issue_test_key(customer.id).await;

        let request = Request::builder()
            .uri("/whoami")
            .header("Authorization", format!("Basic {}", issued.key))
            .body(Body::empty())
            .unwrap();

        let response = app(&server).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_revoked_key_is_rejected() {
        let server = TestServerBuilder::new().build().await;
        let customer = server.create_test_customer("revoked@example.com").await;
        let issued = server.issue_test_key(customer.id).await;
        server
            .database
            .api_keys()
            .revoke(issued.record.id)
            .await
            .unwrap();

        let request = Request::builder()
            .uri("/whoami")
            .header("x-api-key", issued.key.as_str())
            .body(Body::empty())
            .unwrap();

        let response = app(&server).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_string(response).await.contains("revoked"));
    }
}
