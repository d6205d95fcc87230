use crate::{auth::api_key_middleware, server::Server};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{self},
};

/// Helper functions for creating routes with common middleware patterns
pub struct RouteHelpers;

impl RouteHelpers {
    /// Nest `routes` under `path` behind API key authentication and a body limit
    pub fn with_body_limit_auth(
        path: &str,
        routes: Router<Server>,
        server: &Server,
        max_size: usize,
    ) -> Router<Server> {
        Router::new().nest(
            path,
            routes
                .layer(DefaultBodyLimit::max(max_size))
                .layer(middleware::from_fn_with_state(
                    server.clone(),
                    api_key_middleware,
                )),
        )
    }

    pub fn without_auth(path: &str, routes: Router<Server>) -> Router<Server> {
        Router::new().nest(path, routes)
    }
}

/// Middleware factory functions for common patterns
pub mod middleware_factories {
    use crate::auth::AuthContext;
    use crate::utils::request_id::RequestIdExt;
    use axum::{
        body::Body,
        extract::{ConnectInfo, Request},
        middleware::Next,
        response::Response,
    };
    use std::net::SocketAddr;
    use tracing::info;

    /// Structured request/response log lines for API routes
    pub async fn request_response_logger(req: Request<Body>, next: Next) -> Response {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        if !(path.starts_with("/v1") || path.starts_with("/health")) {
            return next.run(req).await;
        }

        let request_id = req.extensions().request_id().as_str();
        let ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|connect_info| connect_info.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        info!(
            method = %method,
            path = %path,
            ip = %ip,
            request_id = %request_id,
            "API request"
        );

        let start = std::time::Instant::now();
        let response = next.run(req).await;
        let duration = start.elapsed();

        // The auth layer mirrors the resolved customer onto the response
        let customer = response
            .extensions()
            .get::<AuthContext>()
            .map(|ctx| ctx.customer_id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        info!(
            method = %method,
            path = %path,
            status = %response.status().as_u16(),
            latency_ms = %duration.as_millis(),
            customer = %customer,
            request_id = %request_id,
            "API response"
        );

        response
    }
}
