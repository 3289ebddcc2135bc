//! Scripted transport for exercising the pipeline without a server.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::request::{ApiRequest, ApiResponse};
use super::transport::Transport;
use super::ApiError;

type Handler = dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync;

/// Answers every request with `handler` and records what was sent.
pub(crate) struct ScriptedTransport {
    handler: Box<Handler>,
    sent: Mutex<Vec<ApiRequest>>,
    // Requests to this path wait this long before being answered.
    latency: Option<(String, Duration)>,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            sent: Mutex::new(Vec::new()),
            latency: None,
        })
    }

    /// Like `new`, but requests to `path` take `delay` to answer.
    pub(crate) fn slow<F>(path: &str, delay: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            sent: Mutex::new(Vec::new()),
            latency: Some((path.to_string(), delay)),
        })
    }

    pub(crate) fn sent(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn sent_to(&self, path: &str) -> Vec<ApiRequest> {
        self.sent().into_iter().filter(|r| r.path == path).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        match &self.latency {
            Some((path, delay)) if *path == request.path => tokio::time::sleep(*delay).await,
            // Give concurrently running requests a chance to interleave.
            _ => tokio::task::yield_now().await,
        }
        (self.handler)(&request)
    }
}

pub(crate) fn json_response(status: StatusCode, body: serde_json::Value) -> Result<ApiResponse, ApiError> {
    Ok(ApiResponse::new(status, body.to_string()))
}

pub(crate) fn ok_json(body: serde_json::Value) -> Result<ApiResponse, ApiError> {
    json_response(StatusCode::OK, body)
}

pub(crate) fn unauthorized() -> Result<ApiResponse, ApiError> {
    json_response(
        StatusCode::UNAUTHORIZED,
        serde_json::json!({ "message": "jwt expired" }),
    )
}
