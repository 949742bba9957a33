use std::sync::RwLock;

use reqwest::Url;
use reqwest::header::{COOKIE, SET_COOKIE};
use rocket::http::Cookie;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::auth::SESSION_COOKIE;

use super::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A call against the `/api` tree; `path` is relative to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_json<B: serde::Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Encode(e.to_string()))?;
        self.body = Some(body);
        Ok(self)
    }

    /// Absolute URL under `base` with the query form-encoded.
    pub fn url(&self, base: &str) -> Result<Url, ClientError> {
        let target = format!("{}{}", base.trim_end_matches('/'), self.path);
        let url = if self.query.is_empty() {
            Url::parse(&target)
        } else {
            Url::parse_with_params(&target, &self.query)
        };
        url.map_err(|e| ClientError::Encode(e.to_string()))
    }

    /// Path plus encoded query string.
    pub fn uri(&self) -> Result<String, ClientError> {
        let url = self.url("http://localhost")?;
        Ok(match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Carries requests to the API and keeps the session cookie between calls,
/// the way a browser would.
#[rocket::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError>;

    /// The session token currently held, if the transport exposes it.
    fn session_token(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCookie {
    Set(String),
    Cleared,
}

/// Reads a `Set-Cookie` header for the session cookie.
pub fn session_cookie(header: &str) -> Option<SessionCookie> {
    let cookie = Cookie::parse(header).ok()?;
    if cookie.name() != SESSION_COOKIE {
        return None;
    }

    let expired = cookie
        .max_age()
        .is_some_and(|age| age.is_zero() || age.is_negative());

    if cookie.value().is_empty() || expired {
        Some(SessionCookie::Cleared)
    } else {
        Some(SessionCookie::Set(cookie.value().to_string()))
    }
}

pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    session: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            session: RwLock::new(None),
        }
    }

    fn store_session(&self, update: SessionCookie) {
        if let Ok(mut token) = self.session.write() {
            *token = match update {
                SessionCookie::Set(value) => Some(value),
                SessionCookie::Cleared => None,
            };
        }
    }
}

#[rocket::async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = ?request.method, path = %request.path))]
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let url = request.url(&format!("{}/api", self.base_url))?;
        let mut builder = self.client.request(method, url);

        if let Some(token) = self.session_token() {
            builder = builder.header(COOKIE, format!("{}={}", SESSION_COOKIE, token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        for header in response.headers().get_all(SET_COOKIE) {
            if let Some(update) = header.to_str().ok().and_then(session_cookie) {
                self.store_session(update);
            }
        }

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        debug!(status = status, "API call completed");

        Ok(ApiResponse { status, body })
    }

    fn session_token(&self) -> Option<String> {
        self.session.read().ok().and_then(|token| token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_parsing() {
        assert_eq!(
            session_cookie("session_token=abc.def; HttpOnly; SameSite=Lax; Path=/"),
            Some(SessionCookie::Set("abc.def".to_string()))
        );
        assert_eq!(
            session_cookie("session_token=; Max-Age=0; Path=/"),
            Some(SessionCookie::Cleared)
        );
        assert_eq!(
            session_cookie(
                "session_token=stale; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
            ),
            Some(SessionCookie::Cleared)
        );
        assert_eq!(session_cookie("other=value; Path=/"), None);
        assert_eq!(session_cookie("not a cookie"), None);
    }

    #[test]
    fn test_uri_encodes_query() {
        let request = ApiRequest::get("/church").with_query(vec![
            ("address".into(), "Main St".into()),
            ("sort".into(), "address:asc".into()),
        ]);

        assert_eq!(
            request.uri().unwrap(),
            "/church?address=Main+St&sort=address%3Aasc"
        );
        assert_eq!(ApiRequest::get("/positions/3").uri().unwrap(), "/positions/3");
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let request = ApiRequest::get("/subjects").with_query(vec![("page".into(), "2".into())]);

        let url = request.url("http://church.example/api/").unwrap();
        assert_eq!(url.as_str(), "http://church.example/api/subjects?page=2");
    }
}
