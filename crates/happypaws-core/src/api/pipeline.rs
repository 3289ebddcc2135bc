//! Authenticated request pipeline.
//!
//! Every call goes through [`AuthPipeline::send`], which attaches the current
//! bearer token and, when the server answers 401/403, refreshes the token
//! once and replays the request once. A request never replays twice.
//!
//! ```text
//! Sent ──► Success
//!   └────► AuthFailure ──► RefreshAttempted ──► Replayed (terminal)
//!                                         └──► SessionCleared (terminal)
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::SessionStore;
use crate::models::TokenPair;

use super::request::{ApiRequest, ApiResponse, RequestBody};
use super::transport::Transport;
use super::ApiError;

const REFRESH_PATH: &str = "/auth/refreshToken";

/// An in-flight call plus its one-shot retry flag.
struct PendingRequest {
    request: ApiRequest,
    retried: bool,
}

impl PendingRequest {
    fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    /// Only requests that need a session and have not been replayed yet
    /// qualify for a refresh.
    fn can_recover(&self, status: StatusCode) -> bool {
        is_auth_status(status) && !self.retried && !self.request.public
    }
}

fn is_auth_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

pub struct AuthPipeline {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    refresh_timeout: Duration,
    // Serializes refreshes so concurrent 401s share one refresh call.
    refresh_lock: Mutex<()>,
}

impl AuthPipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionStore>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            session,
            refresh_timeout,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Send a request, returning the response for 2xx statuses and the
    /// mapped error otherwise.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut pending = PendingRequest::new(request);
        let mut token = self.session.access_token();

        loop {
            let outbound = attach_credentials(&pending.request, token.as_deref())?;
            // No response means nothing to recover from; the session stays.
            let response = self.transport.execute(outbound).await?;

            if response.status.is_success() {
                return Ok(response);
            }
            if !pending.can_recover(response.status) {
                if pending.retried {
                    debug!(
                        path = %pending.request.path,
                        status = response.status.as_u16(),
                        "Replayed request failed"
                    );
                }
                return Err(response.into_error());
            }

            warn!(
                path = %pending.request.path,
                status = response.status.as_u16(),
                "Request not authorized, attempting token refresh"
            );
            let fresh = self.recover(token.as_deref(), response).await?;
            pending.retried = true;
            token = Some(fresh);
            debug!(path = %pending.request.path, "Replaying request with refreshed token");
        }
    }

    /// Obtain a usable access token after an auth failure, or clear the
    /// session and return the error to propagate.
    async fn recover(
        &self,
        failed_token: Option<&str>,
        original: ApiResponse,
    ) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        // Another request refreshed while this one waited for the lock.
        if let Some(current) = self.session.access_token() {
            if failed_token != Some(current.as_str()) {
                debug!("Token already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            warn!("No refresh token available, clearing session");
            self.session.logout();
            return Err(original.into_error());
        };

        match self.refresh(&refresh_token).await {
            Ok(access_token) => Ok(access_token),
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.session.logout();
                Err(ApiError::RefreshFailed(Box::new(e)))
            }
        }
    }

    /// Exchange the refresh token for new tokens and store them. Sent straight
    /// on the transport so a failing refresh can never trigger another one.
    async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))?;
        let request = attach_credentials(&request, None)?;

        let response = tokio::time::timeout(self.refresh_timeout, self.transport.execute(request))
            .await
            .map_err(|_| ApiError::Timeout(self.refresh_timeout))??;

        if !response.status.is_success() {
            return Err(response.into_error());
        }

        let tokens: TokenPair = response.json()?;
        let access_token = tokens
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::InvalidResponse("Refresh response did not include an access token".into())
            })?;
        let refresh_token = tokens.refresh_token.filter(|t| !t.is_empty());

        self.session
            .store_tokens(&access_token, refresh_token.as_deref());
        debug!(rotated = refresh_token.is_some(), "Access token refreshed");
        Ok(access_token)
    }
}

/// Pre-send hook: bearer token when known, JSON content type unless the
/// caller chose one.
fn attach_credentials(request: &ApiRequest, token: Option<&str>) -> Result<ApiRequest, ApiError> {
    let mut outbound = request.clone();
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::Validation("Access token is not a valid header value".into()))?;
        outbound.headers.insert(AUTHORIZATION, value);
    }
    if matches!(outbound.body, RequestBody::Json(_)) && !outbound.headers.contains_key(CONTENT_TYPE) {
        outbound
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(outbound)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::api::testing::{json_response, ok_json, unauthorized, ScriptedTransport};
    use crate::auth::{MemoryStorage, SessionStatus, StorageKey, TokenStorage};

    const PETS: &str = "/pet/getMyPet";

    fn session_with(entries: &[(StorageKey, &str)]) -> (Arc<MemoryStorage>, Arc<SessionStore>) {
        let storage = Arc::new(MemoryStorage::new());
        for (key, value) in entries {
            storage.set(*key, value).unwrap();
        }
        let session = Arc::new(SessionStore::new(storage.clone()));
        session.restore();
        (storage, session)
    }

    fn signed_in(refresh: Option<&str>) -> (Arc<MemoryStorage>, Arc<SessionStore>) {
        let mut entries = vec![
            (StorageKey::AccessToken, "tok1"),
            (StorageKey::User, r#"{"id":"1","name":"A"}"#),
        ];
        if let Some(refresh) = refresh {
            entries.push((StorageKey::RefreshToken, refresh));
        }
        session_with(&entries)
    }

    fn pipeline(transport: Arc<ScriptedTransport>, session: Arc<SessionStore>) -> AuthPipeline {
        AuthPipeline::new(transport, session, Duration::from_secs(5))
    }

    /// 401 unless the request carries `tok3`; refresh issues `tok3`.
    fn expiring_backend(request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        match (request.path.as_str(), request.bearer_token()) {
            (REFRESH_PATH, _) => ok_json(json!({ "accessToken": "tok3" })),
            (_, Some("tok3")) => ok_json(json!({ "pets": [] })),
            _ => unauthorized(),
        }
    }

    #[tokio::test]
    async fn test_attaches_current_token() {
        let (_, session) = signed_in(None);
        let transport = ScriptedTransport::new(|_| ok_json(json!({})));
        let pipeline = pipeline(transport.clone(), session);

        pipeline.send(ApiRequest::get(PETS)).await.unwrap();
        assert_eq!(transport.sent()[0].bearer_token(), Some("tok1"));
    }

    #[tokio::test]
    async fn test_no_token_no_authorization_header() {
        let (_, session) = session_with(&[]);
        let transport = ScriptedTransport::new(|_| ok_json(json!({})));
        let pipeline = pipeline(transport.clone(), session);

        pipeline.send(ApiRequest::get(PETS)).await.unwrap();
        assert!(!transport.sent()[0].headers.contains_key(AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_preset_content_type_is_kept() {
        let (_, session) = session_with(&[]);
        let transport = ScriptedTransport::new(|_| ok_json(json!({})));
        let pipeline = pipeline(transport.clone(), session);

        let request = ApiRequest::post("/pet-details/addPetDetail")
            .json(&json!({ "petId": "p1" }))
            .unwrap()
            .header(CONTENT_TYPE, HeaderValue::from_static("application/vnd.paws+json"));
        pipeline.send(request).await.unwrap();
        pipeline
            .send(ApiRequest::post("/chat/chatbot").json(&json!({ "data": "hi" })).unwrap())
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].headers[CONTENT_TYPE], "application/vnd.paws+json");
        assert_eq!(sent[1].headers[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_refresh_then_replay_with_new_token() {
        let (storage, session) = signed_in(Some("ref1"));
        let transport = ScriptedTransport::new(expiring_backend);
        let pipeline = pipeline(transport.clone(), session.clone());

        let response = pipeline.send(ApiRequest::get(PETS)).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let refreshes = transport.sent_to(REFRESH_PATH);
        assert_eq!(refreshes.len(), 1);
        match &refreshes[0].body {
            RequestBody::Json(body) => assert_eq!(body["refreshToken"], "ref1"),
            other => panic!("unexpected refresh body: {:?}", other),
        }

        let calls = transport.sent_to(PETS);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].bearer_token(), Some("tok1"));
        assert_eq!(calls[1].bearer_token(), Some("tok3"));

        assert_eq!(session.access_token().as_deref(), Some("tok3"));
        assert_eq!(session.refresh_token().as_deref(), Some("ref1"));
        assert_eq!(
            storage.get(StorageKey::AccessToken).unwrap().as_deref(),
            Some("tok3")
        );
    }

    #[tokio::test]
    async fn test_forbidden_also_triggers_refresh() {
        let (_, session) = signed_in(Some("ref1"));
        let transport = ScriptedTransport::new(|request| match request.bearer_token() {
            _ if request.path == REFRESH_PATH => {
                ok_json(json!({ "accessToken": "tok3", "refreshToken": "ref3" }))
            }
            Some("tok3") => ok_json(json!({})),
            _ => json_response(StatusCode::FORBIDDEN, json!({ "message": "forbidden" })),
        });
        let pipeline = pipeline(transport.clone(), session.clone());

        pipeline.send(ApiRequest::get(PETS)).await.unwrap();
        assert_eq!(session.refresh_token().as_deref(), Some("ref3"));
    }

    #[tokio::test]
    async fn test_replay_is_not_retried_again() {
        let (_, session) = signed_in(Some("ref1"));
        let transport = ScriptedTransport::new(|request| {
            if request.path == REFRESH_PATH {
                ok_json(json!({ "accessToken": "tok3" }))
            } else {
                unauthorized()
            }
        });
        let pipeline = pipeline(transport.clone(), session.clone());

        let err = pipeline.send(ApiRequest::get(PETS)).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(transport.sent_to(REFRESH_PATH).len(), 1);
        assert_eq!(transport.sent_to(PETS).len(), 2);
        // The replay's failure is returned as-is.
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_clears_session() {
        let (storage, session) = signed_in(None);
        let transport = ScriptedTransport::new(|_| unauthorized());
        let pipeline = pipeline(transport.clone(), session.clone());

        let err = pipeline.send(ApiRequest::get(PETS)).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(transport.sent_to(REFRESH_PATH).is_empty());
        assert_eq!(transport.sent().len(), 1);

        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert_eq!(storage.get(StorageKey::AccessToken).unwrap(), None);
        assert_eq!(storage.get(StorageKey::User).unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_session() {
        let (storage, session) = signed_in(Some("ref1"));
        let transport = ScriptedTransport::new(|request| {
            if request.path == REFRESH_PATH {
                json_response(StatusCode::UNAUTHORIZED, json!({ "message": "refresh expired" }))
            } else {
                unauthorized()
            }
        });
        let pipeline = pipeline(transport.clone(), session.clone());

        let err = pipeline.send(ApiRequest::get(PETS)).await.unwrap_err();
        match err {
            ApiError::RefreshFailed(inner) => assert!(matches!(*inner, ApiError::Unauthorized)),
            other => panic!("expected refresh failure, got {:?}", other),
        }
        assert_eq!(transport.sent_to(PETS).len(), 1);
        assert!(!session.is_authenticated());
        assert_eq!(storage.get(StorageKey::RefreshToken).unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_without_access_token_is_failure() {
        let (_, session) = signed_in(Some("ref1"));
        let transport = ScriptedTransport::new(|request| {
            if request.path == REFRESH_PATH {
                ok_json(json!({ "message": "ok" }))
            } else {
                unauthorized()
            }
        });
        let pipeline = pipeline(transport, session.clone());

        let err = pipeline.send(ApiRequest::get(PETS)).await.unwrap_err();
        assert!(matches!(err, ApiError::RefreshFailed(_)));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_network_error_clears_session() {
        let (_, session) = signed_in(Some("ref1"));
        let transport = ScriptedTransport::new(|request| {
            if request.path == REFRESH_PATH {
                Err(ApiError::Network("connection reset".into()))
            } else {
                unauthorized()
            }
        });
        let pipeline = pipeline(transport, session.clone());

        let err = pipeline.send(ApiRequest::get(PETS)).await.unwrap_err();
        assert!(matches!(err, ApiError::RefreshFailed(_)));
        assert!(!session.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_timeout_clears_session() {
        let (storage, session) = signed_in(Some("ref1"));
        let transport =
            ScriptedTransport::slow(REFRESH_PATH, Duration::from_secs(60), expiring_backend);
        let pipeline = pipeline(transport.clone(), session.clone());

        let err = pipeline.send(ApiRequest::get(PETS)).await.unwrap_err();
        match err {
            ApiError::RefreshFailed(inner) => {
                assert!(matches!(*inner, ApiError::Timeout(d) if d == Duration::from_secs(5)))
            }
            other => panic!("expected refresh failure, got {:?}", other),
        }
        assert_eq!(transport.sent_to(REFRESH_PATH).len(), 1);
        assert_eq!(transport.sent_to(PETS).len(), 1);
        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert_eq!(storage.get(StorageKey::RefreshToken).unwrap(), None);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_without_session_change() {
        let (_, session) = signed_in(Some("ref1"));
        let transport = ScriptedTransport::new(|_| {
            json_response(StatusCode::INTERNAL_SERVER_ERROR, json!({ "message": "boom" }))
        });
        let pipeline = pipeline(transport.clone(), session.clone());

        let err = pipeline.send(ApiRequest::get(PETS)).await.unwrap_err();
        assert!(matches!(err, ApiError::ServerError(ref m) if m == "boom"));
        assert_eq!(transport.sent().len(), 1);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_network_error_propagates_without_session_change() {
        let (_, session) = signed_in(Some("ref1"));
        let transport =
            ScriptedTransport::new(|_| Err(ApiError::Network("dns failure".into())));
        let pipeline = pipeline(transport.clone(), session.clone());

        let err = pipeline.send(ApiRequest::get(PETS)).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert!(transport.sent_to(REFRESH_PATH).is_empty());
        assert_eq!(session.access_token().as_deref(), Some("tok1"));
    }

    #[tokio::test]
    async fn test_public_request_auth_failure_is_not_recovered() {
        let (_, session) = signed_in(Some("ref1"));
        let transport = ScriptedTransport::new(|_| unauthorized());
        let pipeline = pipeline(transport.clone(), session.clone());

        let err = pipeline
            .send(ApiRequest::post("/auth/login").public())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(transport.sent_to(REFRESH_PATH).is_empty());
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_refresh() {
        let (_, session) = signed_in(Some("ref1"));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let transport = ScriptedTransport::new(move |request| {
            if request.path == REFRESH_PATH {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            expiring_backend(request)
        });
        let pipeline = pipeline(transport.clone(), session);

        let (a, b) = tokio::join!(
            pipeline.send(ApiRequest::get(PETS)),
            pipeline.send(ApiRequest::get("/diseases/getAllDisease")),
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        let replays: Vec<_> = transport
            .sent()
            .into_iter()
            .filter(|r| r.bearer_token() == Some("tok3"))
            .collect();
        assert_eq!(replays.len(), 2);
    }
}
