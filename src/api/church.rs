use rocket::State;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, SessionUser};
use crate::db::{
    CHURCH_SORT_FIELDS, create_church, delete_church, get_church, list_churches, update_church,
};
use crate::error::AppError;
use crate::listing::{Bound, Criteria, ListParams, Paginated, parse_int, parse_timestamp};
use crate::models::{Church, ChurchChanges, MessageResponse, NewChurch, NewChurchImage};
use crate::validation::ValidateExt;

use super::{JsonBody, accept};

#[derive(FromForm, Debug, Default)]
pub struct ChurchFilter {
    pub address: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    #[field(name = "createdAtFrom")]
    pub created_at_from: Option<String>,
    #[field(name = "createdAtTo")]
    pub created_at_to: Option<String>,
}

impl ChurchFilter {
    pub fn criteria(&self) -> Result<Criteria, AppError> {
        Ok(Criteria::new()
            .contains("address", self.address.as_deref())
            .eq("latitude", parse_int("latitude", self.latitude.as_deref())?)
            .eq("longitude", parse_int("longitude", self.longitude.as_deref())?)
            .range(
                "created_at",
                parse_timestamp("createdAtFrom", self.created_at_from.as_deref(), Bound::Start)?,
                parse_timestamp("createdAtTo", self.created_at_to.as_deref(), Bound::End)?,
            ))
    }
}

#[get("/church?<filter..>")]
pub async fn api_list_churches(
    filter: ChurchFilter,
    listing: ListParams,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Paginated<Church>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;

    let page = listing.page_request()?;
    let sort = listing.sort(CHURCH_SORT_FIELDS)?;
    let (churches, total) = list_churches(db, &filter.criteria()?, &sort, &page).await?;

    Ok(Json(Paginated::new(churches, total, &page)))
}

#[get("/church/<id>")]
pub async fn api_get_church(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Church>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_church(db, id).await?))
}

#[post("/church", data = "<church>")]
pub async fn api_create_church(
    church: JsonBody<'_, NewChurch>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<Church>>, AppError> {
    user.require_permission(Permission::ManageChurches)?;

    let church = accept(church)?.validated()?;
    NewChurchImage::check_all(&church.images)?;

    let id = create_church(db, &church).await?;
    let created = get_church(db, id).await?;

    Ok(Created::new(format!("/api/church/{}", id)).body(Json(created)))
}

#[put("/church/<id>", data = "<changes>")]
pub async fn api_update_church(
    id: i64,
    changes: JsonBody<'_, ChurchChanges>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Church>, AppError> {
    user.require_permission(Permission::ManageChurches)?;

    let changes = accept(changes)?.validated()?;
    if let Some(images) = &changes.images {
        NewChurchImage::check_all(images)?;
    }

    update_church(db, id, &changes).await?;
    Ok(Json(get_church(db, id).await?))
}

#[delete("/church/<id>")]
pub async fn api_delete_church(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageChurches)?;

    delete_church(db, id).await?;
    Ok(Json(MessageResponse::new("Church deleted successfully")))
}
