use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::listing::{Criteria, PageRequest, Sort, SortFields, fetch_page};
use crate::models::{NewSubject, Subject, SubjectChanges, UserSummary};

use super::push_id_list;

pub const SUBJECT_SORT_FIELDS: SortFields = &[
    ("id", "id"),
    ("name", "name"),
    ("description", "description"),
    ("disabled", "disabled"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

const SUBJECT_COLUMNS: &str = "id, name, description, disabled, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct SubjectMember {
    subject_id: i64,
    #[sqlx(flatten)]
    user: UserSummary,
}

#[instrument(skip(pool))]
pub async fn list_subjects(
    pool: &Pool<Sqlite>,
    criteria: &Criteria,
    sort: &Sort,
    page: &PageRequest,
    include_users: bool,
) -> Result<(Vec<Subject>, i64), AppError> {
    info!("Listing subjects");
    let (mut subjects, total) =
        fetch_page::<Subject>(pool, "subjects", SUBJECT_COLUMNS, criteria, sort, page).await?;

    if include_users {
        let ids: Vec<i64> = subjects.iter().map(|s| s.id).collect();
        let mut members = users_by_subject(pool, &ids).await?;
        for subject in subjects.iter_mut() {
            subject.users = Some(members.remove(&subject.id).unwrap_or_default());
        }
    }

    Ok((subjects, total))
}

#[instrument(skip(pool))]
pub async fn get_subject(pool: &Pool<Sqlite>, id: i64) -> Result<Subject, AppError> {
    info!("Fetching subject by ID");
    let row = sqlx::query_as::<_, Subject>(
        "SELECT id, name, description, disabled, created_at, updated_at FROM subjects WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(mut subject) = row else {
        return Err(AppError::NotFound("Subject not found".to_string()));
    };

    subject.users = Some(
        users_by_subject(pool, &[id])
            .await?
            .remove(&id)
            .unwrap_or_default(),
    );

    Ok(subject)
}

#[instrument(skip(pool, subject))]
pub async fn create_subject(pool: &Pool<Sqlite>, subject: &NewSubject) -> Result<i64, AppError> {
    info!("Creating subject");
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO subjects (name, description, disabled, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&subject.name)
    .bind(&subject.description)
    .bind(subject.disabled)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(pool, changes))]
pub async fn update_subject(
    pool: &Pool<Sqlite>,
    id: i64,
    changes: &SubjectChanges,
) -> Result<(), AppError> {
    info!("Updating subject");
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE subjects SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(name) = &changes.name {
        qb.push(", name = ").push_bind(name.clone());
    }
    if let Some(description) = &changes.description {
        qb.push(", description = ").push_bind(description.clone());
    }
    if let Some(disabled) = changes.disabled {
        qb.push(", disabled = ").push_bind(disabled);
    }
    qb.push(" WHERE id = ").push_bind(id);

    let result = qb.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    Ok(())
}

/// Refused while any user is still linked to the subject.
#[instrument(skip(pool))]
pub async fn delete_subject(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting subject");
    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_subjects WHERE subject_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if links > 0 {
        warn!(links = links, "Subject still linked to users");
        return Err(AppError::Reference(
            "Cannot delete subject with associated users".to_string(),
        ));
    }

    sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn users_by_subject(
    pool: &Pool<Sqlite>,
    subject_ids: &[i64],
) -> Result<HashMap<i64, Vec<UserSummary>>, AppError> {
    let mut grouped: HashMap<i64, Vec<UserSummary>> = HashMap::new();
    if subject_ids.is_empty() {
        return Ok(grouped);
    }

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT us.subject_id, u.id, u.email, u.role, u.firstname, u.lastname, u.middlename
         FROM user_subjects us JOIN users u ON u.id = us.user_id WHERE us.subject_id",
    );
    push_id_list(&mut qb, subject_ids);
    qb.push(" ORDER BY u.id");

    let members = qb.build_query_as::<SubjectMember>().fetch_all(pool).await?;
    for member in members {
        grouped.entry(member.subject_id).or_default().push(member.user);
    }

    Ok(grouped)
}
