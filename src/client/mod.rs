//! Typed client state for a dashboard consuming the API.
//!
//! A [`ResourceStore`] holds the current page of one resource kind plus the
//! selected item, per-operation flags and the last error. [`AuthStore`]
//! mirrors the session. Both talk to the API through a [`Transport`].

pub mod auth;
pub mod store;
pub mod transport;

pub use auth::*;
pub use store::*;
pub use transport::*;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::validation::ErrorResponse;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Could not encode request: {0}")]
    Encode(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// The text a store keeps in its `error` field.
    pub fn message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Sends `request` and decodes a success body as `T`, or the error envelope
/// into [`ClientError::Api`].
pub async fn call<T, X>(transport: &X, request: ApiRequest) -> Result<T, ClientError>
where
    T: DeserializeOwned,
    X: Transport + ?Sized,
{
    let response = transport.send(request).await?;

    if !response.is_success() {
        let message = serde_json::from_str::<ErrorResponse>(&response.body)
            .map(|body| body.message)
            .unwrap_or_else(|_| format!("Request failed with status {}", response.status));

        return Err(ClientError::Api {
            status: response.status,
            message,
        });
    }

    serde_json::from_str(&response.body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Paging, sorting and filters for a list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort: Option<String>,
    pub filters: Vec<(String, String)>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// `field:direction`, e.g. `createdAt:desc`.
    pub fn sort(mut self, sort: &str) -> Self {
        self.sort = Some(sort.to_string());
        self
    }

    pub fn filter(mut self, name: &str, value: impl ToString) -> Self {
        self.filters.push((name.to_string(), value.to_string()));
        self
    }

    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            pairs.push(("pageSize".to_string(), page_size.to_string()));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort".to_string(), sort.clone()));
        }
        pairs.extend(self.filters.iter().cloned());
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_pairs() {
        let query = ListQuery::new()
            .page(2)
            .page_size(5)
            .sort("address:asc")
            .filter("latitude", 10);

        assert_eq!(
            query.pairs(),
            vec![
                ("page".to_string(), "2".to_string()),
                ("pageSize".to_string(), "5".to_string()),
                ("sort".to_string(), "address:asc".to_string()),
                ("latitude".to_string(), "10".to_string()),
            ]
        );
    }
}
