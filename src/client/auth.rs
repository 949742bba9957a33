use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::auth::{LoginRequest, SessionResponse};
use crate::auth::SessionUser;
use crate::models::MessageResponse;

use super::{ApiRequest, ClientError, Transport, call};

/// Mirrors the server session for the signed-in user.
pub struct AuthStore<T: Transport> {
    transport: Arc<T>,
    pub current_user: Option<SessionUser>,
    pub expires: Option<DateTime<Utc>>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl<T: Transport> AuthStore<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            current_user: None,
            expires: None,
            is_loading: false,
            error: None,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.transport.session_token()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    fn apply(&mut self, session: SessionResponse) -> SessionUser {
        self.current_user = Some(session.user.clone());
        self.expires = Some(session.expires);
        session.user
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<SessionUser, ClientError> {
        self.is_loading = true;
        self.error = None;

        let login = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = match ApiRequest::post("/auth/login").with_json(&login) {
            Ok(request) => call::<SessionResponse, _>(self.transport.as_ref(), request).await,
            Err(err) => Err(err),
        };
        self.is_loading = false;

        match result {
            Ok(session) => Ok(self.apply(session)),
            Err(err) => {
                self.error = Some(err.message());
                Err(err)
            }
        }
    }

    /// Local state is cleared even when the server call fails.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let request = ApiRequest::post("/auth/logout");
        let result = call::<MessageResponse, _>(self.transport.as_ref(), request).await;
        self.reset();
        result.map(|_| ())
    }

    /// Asks the server whether the stored cookie is still a valid session.
    /// A 401 is an answer, not a failure.
    pub async fn check_session(&mut self) -> Result<Option<SessionUser>, ClientError> {
        self.is_loading = true;
        let request = ApiRequest::get("/auth/session");
        let result = call::<SessionResponse, _>(self.transport.as_ref(), request).await;
        self.is_loading = false;

        match result {
            Ok(session) => Ok(Some(self.apply(session))),
            Err(err) if err.status() == Some(401) => {
                self.current_user = None;
                self.expires = None;
                Ok(None)
            }
            Err(err) => {
                self.error = Some(err.message());
                Err(err)
            }
        }
    }

    pub fn reset(&mut self) {
        self.current_user = None;
        self.expires = None;
        self.is_loading = false;
        self.error = None;
    }
}
