use rocket::State;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, SessionUser};
use crate::db::{
    POSITION_SORT_FIELDS, create_position, delete_position, get_position, list_positions,
    update_position,
};
use crate::error::AppError;
use crate::listing::{Bound, Criteria, ListParams, Paginated, parse_bool, parse_timestamp};
use crate::models::{MessageResponse, NewPosition, Position, PositionChanges};
use crate::validation::ValidateExt;

use super::{JsonBody, accept};

#[derive(FromForm, Debug, Default)]
pub struct PositionFilter {
    pub name: Option<String>,
    pub description: Option<String>,
    #[field(name = "createdAtFrom")]
    pub created_at_from: Option<String>,
    #[field(name = "createdAtTo")]
    pub created_at_to: Option<String>,
    #[field(name = "includeUsers")]
    pub include_users: Option<String>,
}

impl PositionFilter {
    pub fn criteria(&self) -> Result<Criteria, AppError> {
        Ok(Criteria::new()
            .contains("name", self.name.as_deref())
            .contains("description", self.description.as_deref())
            .range(
                "created_at",
                parse_timestamp("createdAtFrom", self.created_at_from.as_deref(), Bound::Start)?,
                parse_timestamp("createdAtTo", self.created_at_to.as_deref(), Bound::End)?,
            ))
    }

    pub fn include_users(&self) -> Result<bool, AppError> {
        Ok(parse_bool("includeUsers", self.include_users.as_deref())?.unwrap_or(false))
    }
}

#[get("/positions?<filter..>")]
pub async fn api_list_positions(
    filter: PositionFilter,
    listing: ListParams,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Paginated<Position>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;

    let page = listing.page_request()?;
    let sort = listing.sort(POSITION_SORT_FIELDS)?;
    let (positions, total) = list_positions(
        db,
        &filter.criteria()?,
        &sort,
        &page,
        filter.include_users()?,
    )
    .await?;

    Ok(Json(Paginated::new(positions, total, &page)))
}

#[get("/positions/<id>")]
pub async fn api_get_position(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Position>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_position(db, id).await?))
}

#[post("/positions", data = "<position>")]
pub async fn api_create_position(
    position: JsonBody<'_, NewPosition>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<Position>>, AppError> {
    user.require_permission(Permission::ManagePositions)?;

    let position = accept(position)?.validated()?;
    let id = create_position(db, &position).await?;
    let created = get_position(db, id).await?;

    Ok(Created::new(format!("/api/positions/{}", id)).body(Json(created)))
}

#[put("/positions/<id>", data = "<changes>")]
pub async fn api_update_position(
    id: i64,
    changes: JsonBody<'_, PositionChanges>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Position>, AppError> {
    user.require_permission(Permission::ManagePositions)?;

    let changes = accept(changes)?.validated()?;
    update_position(db, id, &changes).await?;
    Ok(Json(get_position(db, id).await?))
}

#[delete("/positions/<id>")]
pub async fn api_delete_position(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManagePositions)?;

    delete_position(db, id).await?;
    Ok(Json(MessageResponse::new("Position deleted successfully")))
}
