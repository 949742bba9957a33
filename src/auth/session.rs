//! Signed session tokens.
//!
//! A successful login issues an HS256 JWT stored in the http-only
//! `session_token` cookie. The token carries everything the API needs to
//! authorize a request, so the session guard never touches the database.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rocket::Request;
use rocket::http::{Cookie, SameSite, Status};
use rocket::request::{FromRequest, Outcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;

use super::{Permission, Role};

pub const SESSION_COOKIE: &str = "session_token";

/// The user as the session sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn user(&self) -> Result<SessionUser, AppError> {
        let id = self
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Authentication("Invalid session".to_string()))?;

        Ok(SessionUser {
            id,
            role: self.role,
            name: self.name.clone(),
            email: self.email.clone(),
            image: self.image.clone(),
        })
    }

    pub fn expires(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// Signing material plus the session lifetime, kept in managed state.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    max_age: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, max_age_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            max_age: Duration::days(max_age_days),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.auth_secret, config.session_max_age_days)
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn issue(&self, user: &SessionUser) -> Result<(String, Claims), AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            iat: now.timestamp(),
            exp: (now + self.max_age).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))?;

        Ok((token, claims))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Rejected session token");
                AppError::Authentication("Invalid or expired session".to_string())
            })
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(rocket::time::Duration::seconds(self.max_age.num_seconds()))
            .build()
    }
}

impl SessionUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            warn!(
                email = %self.email,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(
                "You do not have permission to perform this action".to_string(),
            ))
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionUser {
    type Error = AppError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("session_guard");
        let _guard = auth_span.enter();

        let Some(keys) = request.rocket().state::<SessionKeys>() else {
            tracing::error!("Session keys not found in managed state");
            return Outcome::Error((
                Status::InternalServerError,
                AppError::Internal("Session keys unavailable".to_string()),
            ));
        };

        let Some(token) = request
            .cookies()
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
        else {
            return Outcome::Error((
                Status::Unauthorized,
                AppError::Authentication("Authentication required".to_string()),
            ));
        };

        match keys.decode(&token).and_then(|claims| claims.user()) {
            Ok(user) => {
                debug!(user_id = user.id, role = %user.role, "Session accepted");
                Outcome::Success(user)
            }
            Err(err) => {
                warn!("Invalid session token");
                Outcome::Error((Status::Unauthorized, err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> SessionUser {
        SessionUser {
            id: 7,
            role: Role::Admin,
            name: "Ana Cruz".to_string(),
            email: "ana@example.com".to_string(),
            image: None,
        }
    }

    #[test]
    fn test_issued_token_decodes_to_same_user() {
        let keys = SessionKeys::new("test-secret", 30);
        let (token, claims) = keys.issue(&sample_user()).unwrap();

        let decoded = keys.decode(&token).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.user().unwrap(), sample_user());
        assert_eq!(decoded.exp - decoded.iat, 30 * 24 * 60 * 60);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let (token, _) = SessionKeys::new("one-secret", 30)
            .issue(&sample_user())
            .unwrap();

        let result = SessionKeys::new("another-secret", 30).decode(&token);
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = SessionKeys::new("test-secret", -2);
        let (token, _) = keys.issue(&sample_user()).unwrap();

        assert!(keys.decode(&token).is_err());
    }

    #[test]
    fn test_worker_cannot_manage() {
        let worker = SessionUser {
            role: Role::Worker,
            ..sample_user()
        };

        assert!(worker.require_permission(Permission::ViewDirectory).is_ok());
        assert!(matches!(
            worker.require_permission(Permission::ManageChurches),
            Err(AppError::Authorization(_))
        ));
    }
}
