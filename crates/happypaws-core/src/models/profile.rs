use serde::Deserialize;

use super::user::BackendUser;

/// `GET /profile/getMyProfile` returns either `user` or a one-element
/// `profile` list depending on the backend version.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub user: Option<BackendUser>,
    #[serde(default)]
    pub profile: Vec<BackendUser>,
}

impl ProfileResponse {
    pub fn into_user(self) -> Option<BackendUser> {
        self.user.or_else(|| self.profile.into_iter().next())
    }
}

/// Reply from `POST /chat/chatbot`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatReply {
    pub fn text(&self) -> Option<&str> {
        self.data
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.message.as_deref())
    }
}
