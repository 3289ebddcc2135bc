use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{LoginResponse, UserProfile};

use super::storage::{StorageKey, TokenStorage};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Backend did not return an access token")]
    MissingToken,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// What observers of the session see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// `restore()` has not finished yet.
    Restoring,
    Anonymous,
    Authenticated,
}

/// Tokens plus cached profile. Either fully authenticated or fully anonymous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(
        access_token: String,
        refresh_token: Option<String>,
        user: UserProfile,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token,
            user: Some(user),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Single source of truth for authentication state.
///
/// Shared as `Arc<SessionStore>` between the request pipeline and whatever
/// front end is running. Lock guards are never held across an `.await`.
pub struct SessionStore {
    storage: Arc<dyn TokenStorage>,
    session: RwLock<Session>,
    status: watch::Sender<SessionStatus>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        let (status, _) = watch::channel(SessionStatus::Restoring);
        Self {
            storage,
            session: RwLock::new(Session::anonymous()),
            status,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Rebuild the session from storage. Never fails: unreadable or
    /// malformed pieces count as absent, and an incomplete session is purged.
    ///
    /// Any stored user object is accepted, including one with an empty id,
    /// since `establish` stores whatever profile the login produced.
    pub fn restore(&self) -> SessionStatus {
        let access_token = self.read_key(StorageKey::AccessToken);
        let refresh_token = self.read_key(StorageKey::RefreshToken);
        let user = self.read_key(StorageKey::User).and_then(|raw| {
            match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "Failed to parse stored user record, discarding");
                    None
                }
            }
        });

        let session = match (access_token, user) {
            (Some(token), Some(user)) => {
                debug!(user_id = %user.id, "Session restored");
                Session::authenticated(token, refresh_token, user)
            }
            _ => {
                debug!("No complete stored session");
                self.clear_storage();
                Session::anonymous()
            }
        };

        self.replace(session)
    }

    /// Exchange credentials for a session and persist it.
    pub async fn login(
        &self,
        api: &ApiClient,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::InvalidInput("Email is required".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidInput("Password is required".to_string()));
        }

        let response = api.authenticate(email, password).await?;
        self.establish(response)
    }

    /// Persist a successful login response and mark the session authenticated.
    pub(crate) fn establish(&self, response: LoginResponse) -> Result<UserProfile, AuthError> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let refresh_token = response.refresh_token.filter(|t| !t.is_empty());
        let user = response.user.unwrap_or_default().to_profile();

        if let Err(e) = self.persist(&access_token, refresh_token.as_deref(), &user) {
            warn!(error = %e, "Failed to persist session, signing out");
            self.logout();
            return Err(AuthError::Storage(e));
        }

        info!(user_id = %user.id, "Login successful");
        self.replace(Session::authenticated(access_token, refresh_token, user.clone()));
        Ok(user)
    }

    /// Drop the session everywhere. Idempotent.
    pub fn logout(&self) {
        self.clear_storage();
        self.replace(Session::anonymous());
        debug!("Session cleared");
    }

    /// Replace the cached profile; tokens are left alone.
    pub fn update_user(&self, user: UserProfile) -> Result<(), AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::NotSignedIn);
        }
        let serialized = serde_json::to_string(&user).map_err(anyhow::Error::from)?;
        self.storage.set(StorageKey::User, &serialized)?;

        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if session.is_authenticated() {
            session.user = Some(user);
        }
        Ok(())
    }

    /// Record tokens issued by a refresh. A missing refresh token keeps the
    /// current one.
    pub(crate) fn store_tokens(&self, access_token: &str, refresh_token: Option<&str>) {
        {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            if !session.is_authenticated() {
                // Logged out while the refresh was in flight.
                warn!("Discarding refreshed tokens for a cleared session");
                return;
            }
            session.access_token = Some(access_token.to_string());
            if let Some(refresh) = refresh_token {
                session.refresh_token = Some(refresh.to_string());
            }
        }

        if let Err(e) = self.storage.set(StorageKey::AccessToken, access_token) {
            warn!(error = %e, "Failed to persist refreshed access token");
        }
        if let Some(refresh) = refresh_token {
            if let Err(e) = self.storage.set(StorageKey::RefreshToken, refresh) {
                warn!(error = %e, "Failed to persist refreshed refresh token");
            }
        }
        debug!("Stored refreshed tokens");
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch status changes, e.g. to redirect to a login prompt.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, session: Session) -> SessionStatus {
        let status = if session.is_authenticated() {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Anonymous
        };
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
        self.status.send_replace(status);
        status
    }

    fn read_key(&self, key: StorageKey) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "Failed to read session storage");
                None
            }
        }
    }

    fn persist(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: &UserProfile,
    ) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(user)?;
        self.storage.set(StorageKey::AccessToken, access_token)?;
        match refresh_token {
            Some(refresh) => self.storage.set(StorageKey::RefreshToken, refresh)?,
            None => self.storage.remove(StorageKey::RefreshToken)?,
        }
        self.storage.set(StorageKey::User, &serialized)?;
        Ok(())
    }

    fn clear_storage(&self) {
        for key in StorageKey::ALL {
            if let Err(e) = self.storage.remove(key) {
                warn!(key = key.as_str(), error = %e, "Failed to clear session storage");
            }
        }
    }
}
