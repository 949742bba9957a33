use rocket::State;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::auth::{Permission, Role, SessionUser};
use crate::db::{
    USER_SORT_FIELDS, create_user, delete_user, get_user_detail, list_user_details, update_user,
};
use crate::error::AppError;
use crate::listing::{
    Bound, Criteria, ListParams, Paginated, parse_enum, parse_int, parse_timestamp,
};
use crate::models::{MaritalStatus, MessageResponse, NewUser, UserChanges, UserDetail};
use crate::validation::{ValidateExt, ensure_passwords_match};

use super::user::{USER_SEARCH_COLUMNS, checked_changes};
use super::{JsonBody, accept};

#[derive(FromForm, Debug, Default)]
pub struct WorkerFilter {
    pub email: Option<String>,
    #[field(name = "churchId")]
    pub church_id: Option<String>,
    #[field(name = "positionId")]
    pub position_id: Option<String>,
    pub status: Option<String>,
    #[field(name = "createdAtFrom")]
    pub created_at_from: Option<String>,
    #[field(name = "createdAtTo")]
    pub created_at_to: Option<String>,
    pub search: Option<String>,
}

impl WorkerFilter {
    pub fn criteria(&self) -> Result<Criteria, AppError> {
        let status = parse_enum::<MaritalStatus>("status", self.status.as_deref())?;

        Ok(Criteria::new()
            .eq("role", Some(Role::Worker.as_str()))
            .contains("email", self.email.as_deref())
            .eq("church_id", parse_int("churchId", self.church_id.as_deref())?)
            .eq("position_id", parse_int("positionId", self.position_id.as_deref())?)
            .eq("status", status.map(|s| s.as_str()))
            .range(
                "created_at",
                parse_timestamp("createdAtFrom", self.created_at_from.as_deref(), Bound::Start)?,
                parse_timestamp("createdAtTo", self.created_at_to.as_deref(), Bound::End)?,
            )
            .search(USER_SEARCH_COLUMNS, self.search.as_deref()))
    }
}

#[get("/users/workers?<filter..>")]
pub async fn api_list_workers(
    filter: WorkerFilter,
    listing: ListParams,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Paginated<UserDetail>>, AppError> {
    user.require_permission(Permission::ManageWorkers)?;

    let page = listing.page_request()?;
    let sort = listing.sort(USER_SORT_FIELDS)?;
    let (workers, total) = list_user_details(db, &filter.criteria()?, &sort, &page).await?;

    Ok(Json(Paginated::new(workers, total, &page)))
}

/// Workers may read their own record.
#[get("/users/workers/<id>")]
pub async fn api_get_worker(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserDetail>, AppError> {
    if !(user.id == id && user.has_permission(Permission::ViewOwnProfile)) {
        user.require_permission(Permission::ManageWorkers)?;
    }

    Ok(Json(get_user_detail(db, id, Some(Role::Worker)).await?))
}

#[post("/users/workers", data = "<payload>")]
pub async fn api_create_worker(
    payload: JsonBody<'_, NewUser>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<UserDetail>>, AppError> {
    user.require_permission(Permission::ManageWorkers)?;

    let payload = accept(payload)?.validated()?;
    ensure_passwords_match(Some(&payload.password), payload.confirm_password.as_deref())?;
    if payload.profile.birthday.is_none() {
        return Err(AppError::Validation("Birthday is required".to_string()));
    }
    payload.dependents.check()?;

    let id = create_user(db, Role::Worker, &payload).await?;
    let created = get_user_detail(db, id, Some(Role::Worker)).await?;

    info!(
        worker_id = id,
        children = created.children.len(),
        subjects = created.subjects.len(),
        "Worker created"
    );

    Ok(Created::new(format!("/api/users/workers/{}", id)).body(Json(created)))
}

#[put("/users/workers/<id>", data = "<changes>")]
pub async fn api_update_worker(
    id: i64,
    changes: JsonBody<'_, UserChanges>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserDetail>, AppError> {
    user.require_permission(Permission::ManageWorkers)?;

    let changes = checked_changes(accept(changes)?)?;
    update_user(db, id, Some(Role::Worker), &changes).await?;
    Ok(Json(get_user_detail(db, id, Some(Role::Worker)).await?))
}

#[delete("/users/workers/<id>")]
pub async fn api_delete_worker(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageWorkers)?;

    delete_user(db, id, Some(Role::Worker)).await?;
    Ok(Json(MessageResponse::new("Worker deleted successfully")))
}
