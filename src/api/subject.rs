use rocket::State;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};

use crate::auth::{Permission, SessionUser};
use crate::db::{
    SUBJECT_SORT_FIELDS, create_subject, delete_subject, get_subject, list_subjects,
    update_subject,
};
use crate::error::AppError;
use crate::listing::{Bound, Criteria, ListParams, Paginated, parse_bool, parse_timestamp};
use crate::models::{MessageResponse, NewSubject, Subject, SubjectChanges};
use crate::validation::ValidateExt;

use super::{JsonBody, accept};

#[derive(FromForm, Debug, Default)]
pub struct SubjectFilter {
    pub name: Option<String>,
    pub description: Option<String>,
    pub disabled: Option<String>,
    #[field(name = "createdAtFrom")]
    pub created_at_from: Option<String>,
    #[field(name = "createdAtTo")]
    pub created_at_to: Option<String>,
    #[field(name = "includeUsers")]
    pub include_users: Option<String>,
}

impl SubjectFilter {
    pub fn criteria(&self) -> Result<Criteria, AppError> {
        Ok(Criteria::new()
            .contains("name", self.name.as_deref())
            .contains("description", self.description.as_deref())
            .eq("disabled", parse_bool("disabled", self.disabled.as_deref())?)
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

#[get("/subjects?<filter..>")]
pub async fn api_list_subjects(
    filter: SubjectFilter,
    listing: ListParams,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Paginated<Subject>>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;

    let page = listing.page_request()?;
    let sort = listing.sort(SUBJECT_SORT_FIELDS)?;
    let (subjects, total) = list_subjects(
        db,
        &filter.criteria()?,
        &sort,
        &page,
        filter.include_users()?,
    )
    .await?;

    Ok(Json(Paginated::new(subjects, total, &page)))
}

#[get("/subjects/<id>")]
pub async fn api_get_subject(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Subject>, AppError> {
    user.require_permission(Permission::ViewDirectory)?;
    Ok(Json(get_subject(db, id).await?))
}

#[post("/subjects", data = "<subject>")]
pub async fn api_create_subject(
    subject: JsonBody<'_, NewSubject>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Json<Subject>>, AppError> {
    user.require_permission(Permission::ManageSubjects)?;

    let subject = accept(subject)?.validated()?;
    let id = create_subject(db, &subject).await?;
    let created = get_subject(db, id).await?;

    Ok(Created::new(format!("/api/subjects/{}", id)).body(Json(created)))
}

#[put("/subjects/<id>", data = "<changes>")]
pub async fn api_update_subject(
    id: i64,
    changes: JsonBody<'_, SubjectChanges>,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Subject>, AppError> {
    user.require_permission(Permission::ManageSubjects)?;

    let changes = accept(changes)?.validated()?;
    update_subject(db, id, &changes).await?;
    Ok(Json(get_subject(db, id).await?))
}

#[delete("/subjects/<id>")]
pub async fn api_delete_subject(
    id: i64,
    user: SessionUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageSubjects)?;

    delete_subject(db, id).await?;
    Ok(Json(MessageResponse::new("Subject deleted successfully")))
}
