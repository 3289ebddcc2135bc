use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::helpers::deserialize_lenient_datetime;

/// `createdBy` is populated on most endpoints but may be a bare id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiseaseAuthor {
    Document {
        #[serde(rename = "_id", default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
    Id(String),
}

impl DiseaseAuthor {
    pub fn id(&self) -> Option<&str> {
        match self {
            DiseaseAuthor::Document { id, .. } => id.as_deref(),
            DiseaseAuthor::Id(id) => Some(id),
        }
    }

    pub fn display(&self) -> &str {
        match self {
            DiseaseAuthor::Document { email: Some(email), .. } => email,
            DiseaseAuthor::Document { name: Some(name), .. } => name,
            _ => "Unknown",
        }
    }
}

/// A shared disease article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disease {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(rename = "createdBy", default)]
    pub created_by: Option<DiseaseAuthor>,
    #[serde(
        rename = "createdAt",
        default,
        deserialize_with = "deserialize_lenient_datetime"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Disease {
    pub fn author(&self) -> &str {
        self.created_by
            .as_ref()
            .map(|a| a.display())
            .unwrap_or("Unknown")
    }

    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.created_by.as_ref().and_then(|a| a.id()) == Some(user_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiseasesResponse {
    #[serde(default)]
    pub diseases: Vec<Disease>,
}

/// Fields of the add/update disease form.
#[derive(Debug, Clone, Default)]
pub struct DiseaseForm {
    pub title: String,
    pub description: String,
    pub species: String,
    pub symptoms: Vec<String>,
}
