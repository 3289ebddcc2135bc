//! The wire seam under the request pipeline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use tracing::debug;

use super::request::{ApiRequest, ApiResponse, FormPart, RequestBody};
use super::ApiError;

/// Sends one request and returns whatever the server answered, including
/// non-2xx statuses. Only failures with no response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// `reqwest`-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn build_form(parts: Vec<FormPart>) -> Result<multipart::Form, ApiError> {
        let mut form = multipart::Form::new();
        for part in parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name, value),
                FormPart::File {
                    name,
                    file_name,
                    mime,
                    bytes,
                } => {
                    let file = multipart::Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(&mime)
                        .map_err(|_| {
                            ApiError::Validation(format!("Invalid content type for {}: {}", name, mime))
                        })?;
                    form.part(name, file)
                }
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut headers = request.headers;
        let mut builder = self.client.request(request.method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(parts) => {
                // reqwest generates the boundary; a preset bare
                // multipart/form-data header would lack it.
                headers.remove(reqwest::header::CONTENT_TYPE);
                builder.multipart(Self::build_form(parts)?)
            }
        };

        let response = builder.headers(headers).send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout)
            } else {
                ApiError::from(e)
            }
        })?;

        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!(status = status.as_u16(), bytes = body.len(), "Response received");

        Ok(ApiResponse { status, body })
    }
}
