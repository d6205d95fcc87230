#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use costgpt::{Server, test_utils::TestServerBuilder};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// A migrated in-memory server with one customer and a valid key for it
pub struct TestHarness {
    pub server: Server,
    pub app: Router,
    pub customer_id: Uuid,
    pub api_key: String,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::from_builder(TestServerBuilder::new()).await
    }

    pub async fn from_builder(builder: TestServerBuilder) -> Self {
        let server = builder.build().await;
        let (customer, api_key) = server
            .create_test_customer_with_key("acme@example.com")
            .await;
        let app = server.create_app();

        Self {
            server,
            app,
            customer_id: customer.id,
            api_key,
        }
    }

    /// Authenticated request; returns the status and the parsed JSON body
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request_with_key(method, uri, body, &self.api_key).await
    }

    pub async fn request_with_key(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        api_key: &str,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", api_key));

        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).to_string(),
            ))
        };
        (status, json)
    }
}
