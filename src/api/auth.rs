use chrono::{DateTime, Utc};
use rocket::State;
use rocket::http::{Cookie, CookieJar};
use rocket::response::status::Created;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{Permission, Role, SESSION_COOKIE, SessionKeys, SessionUser};
use crate::db::{authenticate_user, count_admins, create_first_admin, create_user, get_user};
use crate::error::AppError;
use crate::models::{AdminAccount, BootstrapAdmin, MessageResponse};
use crate::validation::ValidateExt;

use super::{JsonBody, accept};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

#[post("/auth/login", data = "<login>")]
pub async fn api_login(
    login: JsonBody<'_, LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    keys: &State<SessionKeys>,
) -> Result<Json<SessionResponse>, AppError> {
    let login = accept(login)?.validated()?;

    let Some(user) = authenticate_user(db, &login.email, &login.password).await? else {
        return Err(AppError::Authentication(
            "Invalid email or password".to_string(),
        ));
    };

    let session_user = user.session_user();
    let (token, claims) = keys.issue(&session_user)?;
    cookies.add(keys.cookie(token));

    info!(user_id = user.id, role = %user.role, "User logged in");

    Ok(Json(SessionResponse {
        user: session_user,
        expires: claims.expires(),
    }))
}

#[get("/auth/session")]
pub async fn api_session(
    cookies: &CookieJar<'_>,
    keys: &State<SessionKeys>,
) -> Result<Json<SessionResponse>, AppError> {
    let token = cookies
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Authentication("Authentication required".to_string()))?;

    let claims = keys.decode(&token)?;

    Ok(Json(SessionResponse {
        user: claims.user()?,
        expires: claims.expires(),
    }))
}

#[post("/auth/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>) -> Json<MessageResponse> {
    cookies.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Json(MessageResponse::new("Logout successful"))
}

/// Creates an admin. Open while no admin exists; afterwards admins only.
#[post("/create-admin", data = "<admin>")]
pub async fn api_create_admin(
    admin: JsonBody<'_, BootstrapAdmin>,
    session: Option<SessionUser>,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<AdminAccount>>, AppError> {
    let bootstrap = count_admins(db).await? == 0;
    if !bootstrap {
        match &session {
            Some(user) => user.require_permission(Permission::ManageAdmins)?,
            None => {
                return Err(AppError::Authentication(
                    "Authentication required".to_string(),
                ));
            }
        }
    }

    let admin = accept(admin)?.validated()?;
    let new_admin = admin.into_new_user();
    let id = if bootstrap {
        create_first_admin(db, &new_admin).await?
    } else {
        create_user(db, Role::Admin, &new_admin).await?
    };
    let account = AdminAccount::from(get_user(db, id, Some(Role::Admin)).await?);

    info!(user_id = id, "Admin account created");

    Ok(Created::new(format!("/api/users/admin/{}", id)).body(Json(account)))
}
