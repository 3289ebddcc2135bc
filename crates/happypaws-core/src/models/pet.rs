use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::helpers::{deserialize_lenient_datetime, deserialize_ref_id, deserialize_string_or_number};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pet {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub age: Option<String>,
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
}

impl Pet {
    /// e.g. "Rex (Dog, Beagle, 3y)"
    pub fn summary(&self) -> String {
        let traits: Vec<String> = [
            self.kind.clone(),
            self.breed.clone(),
            self.age.as_ref().map(|a| format!("{}y", a)),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();

        if traits.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, traits.join(", "))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PetsResponse {
    #[serde(default)]
    pub pets: Vec<Pet>,
}

/// Fields of the add/update pet form.
#[derive(Debug, Clone, Default)]
pub struct PetForm {
    pub name: String,
    pub kind: String,
    pub breed: String,
    pub age: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PetDetailKind {
    #[serde(rename = "VACCINE")]
    Vaccine,
    #[serde(rename = "VET_CHECKUP")]
    VetCheckup,
    #[serde(rename = "BIRTHDAY")]
    Birthday,
    #[serde(other)]
    Other,
}

impl PetDetailKind {
    pub fn label(&self) -> &'static str {
        match self {
            PetDetailKind::Vaccine => "Vaccine",
            PetDetailKind::VetCheckup => "Vet Checkup",
            PetDetailKind::Birthday => "Birthday",
            PetDetailKind::Other => "Other",
        }
    }
}

/// A dated health record or reminder attached to a pet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetDetail {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "petId", default, deserialize_with = "deserialize_ref_id")]
    pub pet_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: PetDetailKind,
    #[serde(default, deserialize_with = "deserialize_lenient_datetime")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PetDetail {
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.date.map(|d| d >= now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PetDetailsResponse {
    #[serde(default, alias = "reminders")]
    pub details: Vec<PetDetail>,
}

/// Body of `POST /pet-details/addPetDetail`.
#[derive(Debug, Clone, Serialize)]
pub struct NewPetDetail {
    #[serde(rename = "petId")]
    pub pet_id: String,
    #[serde(rename = "type")]
    pub kind: PetDetailKind,
    /// YYYY-MM-DD
    pub date: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
