pub mod admin;
pub mod auth;
pub mod church;
pub mod position;
pub mod subject;
pub mod user;
pub mod worker;

use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::{self, Json};
use rocket::{Catcher, Request, Route};
use tracing::warn;

use crate::error::AppError;
use crate::validation::ErrorResponse;

/// A JSON body whose parse failure is reported through the error envelope.
pub type JsonBody<'r, T> = Result<Json<T>, json::Error<'r>>;

pub fn accept<T>(body: JsonBody<'_, T>) -> Result<T, AppError> {
    body.map(Json::into_inner).map_err(|err| match err {
        json::Error::Io(e) => AppError::Validation(format!("Could not read request body: {}", e)),
        json::Error::Parse(_, e) => AppError::Validation(format!("Invalid request body: {}", e)),
    })
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

pub fn routes() -> Vec<Route> {
    routes![
        health,
        auth::api_login,
        auth::api_session,
        auth::api_logout,
        auth::api_create_admin,
        church::api_list_churches,
        church::api_get_church,
        church::api_create_church,
        church::api_update_church,
        church::api_delete_church,
        position::api_list_positions,
        position::api_get_position,
        position::api_create_position,
        position::api_update_position,
        position::api_delete_position,
        subject::api_list_subjects,
        subject::api_get_subject,
        subject::api_create_subject,
        subject::api_update_subject,
        subject::api_delete_subject,
        user::api_list_users,
        user::api_get_user,
        user::api_create_user,
        user::api_update_user,
        user::api_delete_user,
        worker::api_list_workers,
        worker::api_get_worker,
        worker::api_create_worker,
        worker::api_update_worker,
        worker::api_delete_worker,
        admin::api_list_admins,
        admin::api_get_admin,
        admin::api_create_admin_account,
        admin::api_update_admin,
        admin::api_delete_admin,
    ]
}

fn error_body(status: Status, message: &str) -> Custom<Json<ErrorResponse>> {
    Custom(status, Json(ErrorResponse::new(message)))
}

#[catch(400)]
pub fn bad_request(_req: &Request) -> Custom<Json<ErrorResponse>> {
    error_body(Status::BadRequest, "Bad request")
}

#[catch(401)]
pub fn unauthorized_api(req: &Request) -> Custom<Json<ErrorResponse>> {
    warn!(uri = %req.uri(), "Unauthorized access attempt");
    error_body(Status::Unauthorized, "Authentication required")
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    error_body(
        Status::Forbidden,
        "You do not have permission to perform this action",
    )
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    error_body(Status::NotFound, "Not found")
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    error_body(Status::UnprocessableEntity, "Invalid request")
}

#[catch(500)]
pub fn internal_error_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    error_body(Status::InternalServerError, "Internal server error")
}

#[catch(default)]
pub fn default_api(status: Status, _req: &Request) -> Custom<Json<ErrorResponse>> {
    error_body(status, status.reason().unwrap_or("Request failed"))
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized_api,
        forbidden_api,
        not_found_api,
        unprocessable_api,
        internal_error_api,
        default_api,
    ]
}
