use rocket::State;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, Role, SessionUser};
use crate::db::{ADMIN_SORT_FIELDS, create_user, delete_user, get_user, list_users, update_user};
use crate::error::AppError;
use crate::listing::{Bound, Criteria, ListParams, Paginated, parse_timestamp};
use crate::models::{AdminAccount, DependentsInput, MessageResponse, NewUser, UserChanges};
use crate::validation::{ValidateExt, ensure_passwords_match};

use super::user::{USER_SEARCH_COLUMNS, checked_changes};
use super::{JsonBody, accept};

#[derive(FromForm, Debug, Default)]
pub struct AdminFilter {
    pub email: Option<String>,
    pub search: Option<String>,
    #[field(name = "createdAtFrom")]
    pub created_at_from: Option<String>,
    #[field(name = "createdAtTo")]
    pub created_at_to: Option<String>,
}

impl AdminFilter {
    pub fn criteria(&self) -> Result<Criteria, AppError> {
        Ok(Criteria::new()
            .eq("role", Some(Role::Admin.as_str()))
            .contains("email", self.email.as_deref())
            .search(USER_SEARCH_COLUMNS, self.search.as_deref())
            .range(
                "created_at",
                parse_timestamp("createdAtFrom", self.created_at_from.as_deref(), Bound::Start)?,
                parse_timestamp("createdAtTo", self.created_at_to.as_deref(), Bound::End)?,
            ))
    }
}

#[get("/users/admin?<filter..>")]
pub async fn api_list_admins(
    filter: AdminFilter,
    listing: ListParams,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Paginated<AdminAccount>>, AppError> {
    user.require_permission(Permission::ManageAdmins)?;

    let page = listing.page_request()?;
    let sort = listing.sort(ADMIN_SORT_FIELDS)?;
    let (admins, total) = list_users(db, &filter.criteria()?, &sort, &page).await?;

    Ok(Json(
        Paginated::new(admins, total, &page).map(AdminAccount::from),
    ))
}

#[get("/users/admin/<id>")]
pub async fn api_get_admin(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AdminAccount>, AppError> {
    user.require_permission(Permission::ManageAdmins)?;
    Ok(Json(get_user(db, id, Some(Role::Admin)).await?.into()))
}

/// Admin accounts carry no dependent collections.
#[post("/users/admin", data = "<payload>")]
pub async fn api_create_admin_account(
    payload: JsonBody<'_, NewUser>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<AdminAccount>>, AppError> {
    user.require_permission(Permission::ManageAdmins)?;

    let mut payload = accept(payload)?.validated()?;
    ensure_passwords_match(Some(&payload.password), payload.confirm_password.as_deref())?;
    payload.dependents = DependentsInput::default();

    let id = create_user(db, Role::Admin, &payload).await?;
    let created = AdminAccount::from(get_user(db, id, Some(Role::Admin)).await?);

    Ok(Created::new(format!("/api/users/admin/{}", id)).body(Json(created)))
}

#[put("/users/admin/<id>", data = "<changes>")]
pub async fn api_update_admin(
    id: i64,
    changes: JsonBody<'_, UserChanges>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AdminAccount>, AppError> {
    user.require_permission(Permission::ManageAdmins)?;

    let mut changes = checked_changes(accept(changes)?)?;
    changes.dependents = DependentsInput::default();

    update_user(db, id, Some(Role::Admin), &changes).await?;
    Ok(Json(get_user(db, id, Some(Role::Admin)).await?.into()))
}

#[delete("/users/admin/<id>")]
pub async fn api_delete_admin(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageAdmins)?;

    if user.id == id {
        return Err(AppError::Validation(
            "You cannot delete your own account".to_string(),
        ));
    }

    delete_user(db, id, Some(Role::Admin)).await?;
    Ok(Json(MessageResponse::new("Admin deleted successfully")))
}
