//! Data models for Happy Paws entities.
//!
//! - `UserProfile`, `BackendUser`: the signed-in user and its wire form
//! - `Pet`, `PetDetail`: pets and their dated health records
//! - `Disease`: shared disease articles
//! - `ProfileResponse`, `ChatReply`: profile and chat assistant payloads

mod helpers;
pub mod disease;
pub mod pet;
pub mod profile;
pub mod user;

pub use disease::{Disease, DiseaseAuthor, DiseaseForm, DiseasesResponse};
pub use pet::{NewPetDetail, Pet, PetDetail, PetDetailKind, PetDetailsResponse, PetForm, PetsResponse};
pub use profile::{ChatReply, ProfileResponse};
pub use user::{BackendUser, LoginResponse, TokenPair, UserProfile};
