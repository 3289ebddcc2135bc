//! Core library for the Happy Paws pet-care client.
//!
//! A [`SessionStore`] holds the tokens and cached profile; an [`ApiClient`]
//! sends every call through the authenticated request pipeline, which keeps
//! that store current across token expiry.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use happypaws_core::{ApiClient, Config, SessionStore};
//!
//! let config = Config::load()?;
//! let session = Arc::new(SessionStore::new(config.open_storage()?));
//! session.restore();
//!
//! let api = ApiClient::new(&config, session.clone())?;
//! session.login(&api, "a@x.com", "secret").await?;
//! let pets = api.fetch_my_pets().await?;
//! # let _ = pets;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthError, SessionStatus, SessionStore};
pub use config::Config;
