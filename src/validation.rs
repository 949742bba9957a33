use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

pub const MIN_PASSWORD_LENGTH: u64 = 8;

/// The error envelope every endpoint and catcher answers with.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            error: None,
            errors: None,
        }
    }

    pub fn with_detail(message: &str, detail: &str) -> Self {
        Self {
            message: message.to_string(),
            error: Some(detail.to_string()),
            errors: None,
        }
    }

    /// The first field message (by field name) becomes the headline so a
    /// single failing field reads naturally, e.g. "Description is required".
    pub fn from_field_errors(errors: &ValidationErrors) -> Self {
        let mut error_map: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (field, field_errors) in errors.field_errors() {
            let messages = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), messages);
        }

        let message = error_map
            .values()
            .flat_map(|messages| messages.first())
            .next()
            .cloned()
            .unwrap_or_else(|| "Validation failed".to_string());

        Self {
            message,
            error: None,
            errors: Some(error_map),
        }
    }
}

pub trait ValidateExt: Validate + Sized {
    fn validated(self) -> Result<Self, AppError> {
        self.validate()?;
        Ok(self)
    }
}

impl<T: Validate> ValidateExt for T {}

/// Rejects a supplied password whose confirmation is missing or different.
pub fn ensure_passwords_match(
    password: Option<&str>,
    confirm_password: Option<&str>,
) -> Result<(), AppError> {
    match (password, confirm_password) {
        (Some(password), Some(confirm)) if password == confirm => Ok(()),
        (Some(_), _) => Err(AppError::Validation("Passwords do not match".to_string())),
        (None, _) => Ok(()),
    }
}
