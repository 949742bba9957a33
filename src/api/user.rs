use rocket::State;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, Role, SessionUser};
use crate::db::{
    USER_SORT_FIELDS, create_user, delete_user, get_user_detail, list_user_details, update_user,
};
use crate::error::AppError;
use crate::listing::{
    Bound, Criteria, ListParams, Paginated, parse_date, parse_enum, parse_int, parse_timestamp,
};
use crate::models::{Gender, MaritalStatus, MessageResponse, NewUser, UserChanges, UserDetail};
use crate::validation::{ValidateExt, ensure_passwords_match};

use super::{JsonBody, accept};

pub const USER_SEARCH_COLUMNS: &[&str] = &["firstname", "lastname", "email"];

#[derive(FromForm, Debug, Default)]
pub struct UserFilter {
    pub role: Option<String>,
    pub gender: Option<String>,
    pub status: Option<String>,
    #[field(name = "churchId")]
    pub church_id: Option<String>,
    #[field(name = "positionId")]
    pub position_id: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    #[field(name = "birthdayFrom")]
    pub birthday_from: Option<String>,
    #[field(name = "birthdayTo")]
    pub birthday_to: Option<String>,
    #[field(name = "createdAtFrom")]
    pub created_at_from: Option<String>,
    #[field(name = "createdAtTo")]
    pub created_at_to: Option<String>,
    pub search: Option<String>,
}

impl UserFilter {
    pub fn criteria(&self) -> Result<Criteria, AppError> {
        let role = parse_enum::<Role>("role", self.role.as_deref())?;
        let gender = parse_enum::<Gender>("gender", self.gender.as_deref())?;
        let status = parse_enum::<MaritalStatus>("status", self.status.as_deref())?;

        Ok(Criteria::new()
            .eq("role", role.map(|r| r.as_str()))
            .eq("gender", gender.map(|g| g.as_str()))
            .eq("status", status.map(|s| s.as_str()))
            .eq("church_id", parse_int("churchId", self.church_id.as_deref())?)
            .eq("position_id", parse_int("positionId", self.position_id.as_deref())?)
            .contains("email", self.email.as_deref())
            .contains("contact", self.contact.as_deref())
            .contains("address", self.address.as_deref())
            .range(
                "birthday",
                parse_date("birthdayFrom", self.birthday_from.as_deref())?,
                parse_date("birthdayTo", self.birthday_to.as_deref())?,
            )
            .range(
                "created_at",
                parse_timestamp("createdAtFrom", self.created_at_from.as_deref(), Bound::Start)?,
                parse_timestamp("createdAtTo", self.created_at_to.as_deref(), Bound::End)?,
            )
            .search(USER_SEARCH_COLUMNS, self.search.as_deref()))
    }
}

/// Validation shared by every user update route.
pub(crate) fn checked_changes(changes: UserChanges) -> Result<UserChanges, AppError> {
    let changes = changes.without_blank_password().validated()?;
    if changes.password.is_some() {
        ensure_passwords_match(
            changes.password.as_deref(),
            changes.confirm_password.as_deref(),
        )?;
    }
    changes.dependents.check()?;
    Ok(changes)
}

#[get("/users?<filter..>")]
pub async fn api_list_users(
    filter: UserFilter,
    listing: ListParams,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Paginated<UserDetail>>, AppError> {
    user.require_permission(Permission::ManageUsers)?;

    let page = listing.page_request()?;
    let sort = listing.sort(USER_SORT_FIELDS)?;
    let (users, total) = list_user_details(db, &filter.criteria()?, &sort, &page).await?;

    Ok(Json(Paginated::new(users, total, &page)))
}

#[get("/users/<id>")]
pub async fn api_get_user(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserDetail>, AppError> {
    user.require_permission(Permission::ManageUsers)?;
    Ok(Json(get_user_detail(db, id, None).await?))
}

#[post("/users", data = "<payload>")]
pub async fn api_create_user(
    payload: JsonBody<'_, NewUser>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<UserDetail>>, AppError> {
    user.require_permission(Permission::ManageUsers)?;

    let payload = accept(payload)?.validated()?;
    if payload.confirm_password.is_some() {
        ensure_passwords_match(Some(&payload.password), payload.confirm_password.as_deref())?;
    }
    payload.dependents.check()?;

    let id = create_user(db, payload.role.unwrap_or_default(), &payload).await?;
    let created = get_user_detail(db, id, None).await?;

    Ok(Created::new(format!("/api/users/{}", id)).body(Json(created)))
}

#[put("/users/<id>", data = "<changes>")]
pub async fn api_update_user(
    id: i64,
    changes: JsonBody<'_, UserChanges>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserDetail>, AppError> {
    user.require_permission(Permission::ManageUsers)?;

    let changes = checked_changes(accept(changes)?)?;
    update_user(db, id, None, &changes).await?;
    Ok(Json(get_user_detail(db, id, None).await?))
}

#[delete("/users/<id>")]
pub async fn api_delete_user(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageUsers)?;

    if user.id == id {
        return Err(AppError::Validation(
            "You cannot delete your own account".to_string(),
        ));
    }

    delete_user(db, id, None).await?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
