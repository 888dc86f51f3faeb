// SPDX-License-Identifier: Apache-2.0
//! The HTTP+JSON carrier: one POST endpoint fronting the dispatch table.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router as AxumRouter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::{DispatchError, Dispatcher};

#[derive(Debug, Deserialize)]
struct Envelope {
    method: String,
    #[serde(default)]
    params: Value,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl DispatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::MethodNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

async fn handle(State(dispatcher): State<Arc<Dispatcher>>, Json(envelope): Json<Envelope>) -> Response {
    let result = dispatcher.dispatch(&envelope.method, envelope.params).await;

    let Some(id) = envelope.id else {
        // A notification: the caller does not want a body, just an ack.
        let _ = result;
        return StatusCode::ACCEPTED.into_response();
    };

    match result {
        Ok(value) => Json(serde_json::json!({ "id": id, "result": value })).into_response(),
        Err(err) => (
            err.status_code(),
            Json(serde_json::json!({ "id": id, "error": ErrorBody { message: err.to_string() } })),
        )
            .into_response(),
    }
}

/// Build the axum router. The caller owns binding it to a listener.
pub fn build_router(dispatcher: Dispatcher) -> AxumRouter {
    AxumRouter::new().route("/", post(handle)).with_state(Arc::new(dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn dispatcher_with_echo() -> Dispatcher {
        let mut d = Dispatcher::new();
        d.register("echo", |params| async move { Ok(params) });
        d
    }

    #[tokio::test]
    async fn request_with_id_returns_result_body() {
        let app = build_router(dispatcher_with_echo());
        let body = json!({"method": "echo", "params": {"x": 1}, "id": 7});
        let response = app
            .oneshot(Request::post("/").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn notification_without_id_returns_empty_202() {
        let app = build_router(dispatcher_with_echo());
        let body = json!({"method": "echo", "params": {}});
        let response = app
            .oneshot(Request::post("/").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn unknown_method_returns_not_found() {
        let app = build_router(dispatcher_with_echo());
        let body = json!({"method": "nope", "params": {}, "id": 1});
        let response = app
            .oneshot(Request::post("/").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
