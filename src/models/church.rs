use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Church {
    pub id: i64,
    pub address: String,
    pub latitude: i64,
    pub longitude: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub images: Vec<ChurchImage>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChurchImage {
    pub id: i64,
    pub image: String,
    pub church_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbChurch {
    pub id: i64,
    pub address: String,
    pub latitude: i64,
    pub longitude: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbChurch {
    pub fn with_images(self, images: Vec<ChurchImage>) -> Church {
        Church {
            id: self.id,
            address: self.address,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: self.created_at,
            updated_at: self.updated_at,
            images,
        }
    }
}

/// The church as embedded in a user record.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChurchSummary {
    pub id: i64,
    pub address: String,
    pub latitude: i64,
    pub longitude: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewChurchImage {
    pub image: String,
}

impl NewChurchImage {
    pub fn check_all(images: &[NewChurchImage]) -> Result<(), AppError> {
        if images.iter().any(|i| i.image.trim().is_empty()) {
            return Err(AppError::Validation("Image URL is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewChurch {
    #[serde(default)]
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    pub latitude: i64,
    pub longitude: i64,
    #[serde(default)]
    pub images: Vec<NewChurchImage>,
}

/// Fields left out stay as they are; `images`, when present, replaces the
/// whole image set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChurchChanges {
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: Option<String>,
    pub latitude: Option<i64>,
    pub longitude: Option<i64>,
    pub images: Option<Vec<NewChurchImage>>,
}
