use serde::{Deserialize, Serialize};

/// The signed-in user as cached by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(
        rename = "profileImage",
        alias = "profileImageUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// User object as the backend sends it. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendUser {
    #[serde(rename = "_id", default)]
    pub mongo_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

impl BackendUser {
    /// Normalize into a profile, defaulting absent fields.
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self
                .mongo_id
                .clone()
                .or_else(|| self.id.clone())
                .unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            email: self.email.clone().unwrap_or_default(),
            profile_image_url: self.image_url.clone().filter(|url| !url.is_empty()),
            roles: self.roles.clone().unwrap_or_default(),
        }
    }
}

/// Body of a successful `POST /auth/login`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken", default)]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
    #[serde(alias = "data", default)]
    pub user: Option<BackendUser>,
}

/// Body of a successful `POST /auth/refreshToken`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken", default)]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
}
