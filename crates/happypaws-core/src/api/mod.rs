//! REST API client module for the Happy Paws backend.
//!
//! - `ApiClient`: typed calls for auth, pets, diseases, chat and profile
//! - `AuthPipeline`: bearer attachment and the one-shot refresh/replay flow
//! - `Transport`: the wire seam, implemented over reqwest by `HttpTransport`

pub mod client;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, PasswordReset};
pub use error::ApiError;
pub use pipeline::AuthPipeline;
pub use request::{ApiRequest, ApiResponse, FormPart, ImageUpload, RequestBody};
pub use transport::{HttpTransport, Transport};
