//! API client for the Happy Paws backend.
//!
//! Every method goes through the [`AuthPipeline`], so callers never deal with
//! bearer tokens or refreshes themselves.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::SessionStore;
use crate::config::Config;
use crate::models::{
    ChatReply, Disease, DiseaseForm, DiseasesResponse, LoginResponse, NewPetDetail, Pet,
    PetDetail, PetDetailsResponse, PetForm, PetsResponse, ProfileResponse, UserProfile,
};

use super::pipeline::AuthPipeline;
use super::request::{ApiRequest, ApiResponse, FormPart, ImageUpload};
use super::transport::{HttpTransport, Transport};
use super::ApiError;

/// Body of `POST /auth/reset_password`.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordReset {
    pub email: String,
    pub code: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

/// Clone is cheap - the pipeline and its transport are shared.
#[derive(Clone)]
pub struct ApiClient {
    pipeline: Arc<AuthPipeline>,
}

impl ApiClient {
    /// Create a client talking HTTP to the configured backend.
    pub fn new(config: &Config, session: Arc<SessionStore>) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(config.api_base_url(), config.request_timeout())?;
        Ok(Self::with_transport(
            Arc::new(transport),
            session,
            config.refresh_timeout(),
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        session: Arc<SessionStore>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            pipeline: Arc::new(AuthPipeline::new(transport, session, refresh_timeout)),
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.pipeline.session()
    }

    /// Send an arbitrary request through the pipeline.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.pipeline.send(request).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        response.json().map_err(|e| {
            warn!(path = %path, error = %e, "Unexpected response body");
            e
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    fn require(value: &str, what: &str) -> Result<(), ApiError> {
        if value.trim().is_empty() {
            Err(ApiError::Validation(format!("{} is required", what)))
        } else {
            Ok(())
        }
    }

    // ===== Auth =====

    /// Exchange credentials for tokens. Use [`SessionStore::login`] to also
    /// establish the session.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        Self::require(email, "Email")?;
        Self::require(password, "Password")?;
        let request = ApiRequest::post("/auth/login")
            .json(&serde_json::json!({ "email": email, "password": password }))?
            .public();
        self.send_json(request).await
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
        Self::require(name, "Name")?;
        Self::require(email, "Email")?;
        Self::require(password, "Password")?;
        let request = ApiRequest::post("/auth/register")
            .json(&serde_json::json!({ "name": name, "email": email, "password": password }))?
            .public();
        self.send(request).await?;
        Ok(())
    }

    /// Ask the backend to email a verification code.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        Self::require(email, "Email")?;
        let request = ApiRequest::post("/auth/forget_password")
            .json(&serde_json::json!({ "email": email }))?
            .public();
        self.send(request).await?;
        Ok(())
    }

    pub async fn reset_password(&self, reset: &PasswordReset) -> Result<(), ApiError> {
        Self::require(&reset.email, "Email")?;
        Self::require(&reset.code, "Verification code")?;
        Self::require(&reset.new_password, "New password")?;
        let request = ApiRequest::post("/auth/reset_password").json(reset)?.public();
        self.send(request).await?;
        Ok(())
    }

    // ===== Pets =====

    pub async fn fetch_my_pets(&self) -> Result<Vec<Pet>, ApiError> {
        let response: PetsResponse = self.get("/pet/getMyPet").await?;
        debug!(count = response.pets.len(), "Fetched pets");
        Ok(response.pets)
    }

    fn pet_form(form: &PetForm, image: Option<ImageUpload>) -> Result<Vec<FormPart>, ApiError> {
        Self::require(&form.name, "Pet name")?;
        let mut parts = vec![
            FormPart::text("name", form.name.trim()),
            FormPart::text("type", form.kind.trim()),
            FormPart::text("breed", form.breed.trim()),
            FormPart::text("age", form.age.trim()),
        ];
        if let Some(image) = image {
            parts.push(image.into_part("image"));
        }
        Ok(parts)
    }

    pub async fn add_pet(&self, form: &PetForm, image: Option<ImageUpload>) -> Result<(), ApiError> {
        let parts = Self::pet_form(form, image)?;
        self.send(ApiRequest::post("/pet/addPet").multipart(parts)).await?;
        Ok(())
    }

    pub async fn update_pet(
        &self,
        pet_id: &str,
        form: &PetForm,
        image: Option<ImageUpload>,
    ) -> Result<(), ApiError> {
        Self::require(pet_id, "Pet id")?;
        let mut parts = Self::pet_form(form, image)?;
        parts.push(FormPart::text("petId", pet_id));
        self.send(ApiRequest::post("/pet/updatePet").multipart(parts)).await?;
        Ok(())
    }

    pub async fn delete_pet(&self, pet_id: &str) -> Result<(), ApiError> {
        Self::require(pet_id, "Pet id")?;
        let request =
            ApiRequest::delete("/pet/deletePet").json(&serde_json::json!({ "petId": pet_id }))?;
        self.send(request).await?;
        Ok(())
    }

    // ===== Diseases =====

    pub async fn fetch_all_diseases(&self) -> Result<Vec<Disease>, ApiError> {
        let response: DiseasesResponse = self.get("/diseases/getAllDisease").await?;
        Ok(response.diseases)
    }

    /// Articles written by the signed-in user.
    pub async fn fetch_my_diseases(&self) -> Result<Vec<Disease>, ApiError> {
        let response: DiseasesResponse = self.get("/diseases/getAllDiseasesByUser").await?;
        Ok(response.diseases)
    }

    fn disease_form(
        form: &DiseaseForm,
        image: Option<ImageUpload>,
    ) -> Result<Vec<FormPart>, ApiError> {
        Self::require(&form.title, "Title")?;
        Self::require(&form.description, "Description")?;
        Self::require(&form.species, "Species")?;
        if form.symptoms.iter().all(|s| s.trim().is_empty()) {
            return Err(ApiError::Validation("Symptoms are required".to_string()));
        }
        let symptoms: Vec<&str> = form
            .symptoms
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        let mut parts = vec![
            FormPart::text("title", form.title.trim()),
            FormPart::text("description", form.description.trim()),
            FormPart::text("species", form.species.trim()),
            FormPart::text("symptoms", symptoms.join(", ")),
        ];
        if let Some(image) = image {
            parts.push(image.into_part("image"));
        }
        Ok(parts)
    }

    pub async fn add_disease(
        &self,
        form: &DiseaseForm,
        image: Option<ImageUpload>,
    ) -> Result<(), ApiError> {
        let parts = Self::disease_form(form, image)?;
        self.send(ApiRequest::post("/diseases/addDisease").multipart(parts))
            .await?;
        Ok(())
    }

    pub async fn update_disease(
        &self,
        disease_id: &str,
        form: &DiseaseForm,
        image: Option<ImageUpload>,
    ) -> Result<(), ApiError> {
        Self::require(disease_id, "Disease id")?;
        let mut parts = Self::disease_form(form, image)?;
        parts.push(FormPart::text("diseaseId", disease_id));
        self.send(ApiRequest::post("/diseases/updateDisease").multipart(parts))
            .await?;
        Ok(())
    }

    pub async fn delete_disease(&self, disease_id: &str) -> Result<(), ApiError> {
        Self::require(disease_id, "Disease id")?;
        let path = format!("/diseases/deleteDisease/{}", disease_id.trim());
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }

    // ===== Chat =====

    /// Ask the assistant a question and return its answer.
    pub async fn send_chat_message(&self, message: &str) -> Result<String, ApiError> {
        Self::require(message, "Message")?;
        let response = self
            .post_json("/chat/chatbot", &serde_json::json!({ "data": message }))
            .await?;
        let reply: ChatReply = response.json()?;
        reply
            .text()
            .map(str::to_string)
            .ok_or_else(|| ApiError::InvalidResponse("Chat reply had no text".to_string()))
    }

    // ===== Profile =====

    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let response: ProfileResponse = self.get("/profile/getMyProfile").await?;
        response
            .into_user()
            .map(|user| user.to_profile())
            .ok_or_else(|| ApiError::InvalidResponse("Profile response had no user".to_string()))
    }

    /// Update name and optionally the avatar, then refresh the cached user.
    pub async fn update_profile(
        &self,
        name: &str,
        image: Option<ImageUpload>,
    ) -> Result<(), ApiError> {
        Self::require(name, "Name")?;
        let mut parts = vec![FormPart::text("name", name.trim())];
        if let Some(image) = image {
            parts.push(image.into_part("image"));
        }
        let response = self
            .send(ApiRequest::post("/profile/updateProfile").multipart(parts))
            .await?;

        let Some(mut cached) = self.session().user() else {
            return Ok(());
        };
        let returned = response
            .json::<ProfileResponse>()
            .ok()
            .and_then(ProfileResponse::into_user)
            .map(|user| user.to_profile());
        match returned {
            Some(updated) => {
                cached.name = updated.name;
                if updated.profile_image_url.is_some() {
                    cached.profile_image_url = updated.profile_image_url;
                }
            }
            None => cached.name = name.trim().to_string(),
        }
        if let Err(e) = self.session().update_user(cached) {
            warn!(error = %e, "Failed to update cached profile");
        }
        Ok(())
    }

    /// Permanently delete the account; the local session is cleared on success.
    pub async fn delete_account(&self, email: &str, password: &str) -> Result<(), ApiError> {
        Self::require(email, "Email")?;
        Self::require(password, "Password")?;
        let request = ApiRequest::delete("/profile/deleteAccount")
            .json(&serde_json::json!({ "email": email, "password": password }))?;
        self.send(request).await?;
        self.session().logout();
        Ok(())
    }

    // ===== Pet Details =====

    pub async fn fetch_pet_details(&self, pet_id: &str) -> Result<Vec<PetDetail>, ApiError> {
        Self::require(pet_id, "Pet id")?;
        let path = format!("/pet-details/getMyPetDetails/{}", pet_id.trim());
        let response: PetDetailsResponse = self.get(&path).await?;
        Ok(response.details)
    }

    pub async fn add_pet_detail(&self, detail: &NewPetDetail) -> Result<(), ApiError> {
        Self::require(&detail.pet_id, "Pet id")?;
        Self::require(&detail.date, "Date")?;
        Self::require(&detail.description, "Description")?;
        self.post_json("/pet-details/addPetDetail", detail).await?;
        Ok(())
    }

    pub async fn delete_pet_detail(&self, detail_id: &str) -> Result<(), ApiError> {
        Self::require(detail_id, "Detail id")?;
        let request = ApiRequest::delete("/pet-details/deletePetDetail").query("detailId", detail_id);
        self.send(request).await?;
        Ok(())
    }

    /// Upcoming reminders across all of the user's pets.
    pub async fn fetch_reminders(&self) -> Result<Vec<PetDetail>, ApiError> {
        let response: PetDetailsResponse = self.get("/pet-details/getMyPetDetailsReminder").await?;
        Ok(response.details)
    }
}
