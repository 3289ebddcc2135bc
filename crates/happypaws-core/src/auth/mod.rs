//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: tokens and cached profile, restored at startup
//! - `TokenStorage`: durable slots the session is persisted in, backed by
//!   files (`FileStorage`), the OS keychain (`KeyringStorage`) or memory

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::KeyringStorage;
pub use session::{AuthError, Session, SessionStatus, SessionStore};
pub use storage::{FileStorage, MemoryStorage, StorageKey, TokenStorage};
