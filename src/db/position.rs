use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::listing::{Criteria, PageRequest, Sort, SortFields, fetch_page};
use crate::models::{NewPosition, Position, PositionChanges, UserSummary};

use super::push_id_list;

pub const POSITION_SORT_FIELDS: SortFields = &[
    ("id", "id"),
    ("name", "name"),
    ("description", "description"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

const POSITION_COLUMNS: &str = "id, name, description, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PositionMember {
    position_id: i64,
    #[sqlx(flatten)]
    user: UserSummary,
}

#[instrument(skip(pool))]
pub async fn list_positions(
    pool: &Pool<Sqlite>,
    criteria: &Criteria,
    sort: &Sort,
    page: &PageRequest,
    include_users: bool,
) -> Result<(Vec<Position>, i64), AppError> {
    info!("Listing positions");
    let (mut positions, total) =
        fetch_page::<Position>(pool, "positions", POSITION_COLUMNS, criteria, sort, page).await?;

    if include_users {
        let ids: Vec<i64> = positions.iter().map(|p| p.id).collect();
        let mut members = users_by_position(pool, &ids).await?;
        for position in positions.iter_mut() {
            position.users = Some(members.remove(&position.id).unwrap_or_default());
        }
    }

    Ok((positions, total))
}

#[instrument(skip(pool))]
pub async fn get_position(pool: &Pool<Sqlite>, id: i64) -> Result<Position, AppError> {
    info!("Fetching position by ID");
    let row = sqlx::query_as::<_, Position>(
        "SELECT id, name, description, created_at, updated_at FROM positions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(mut position) = row else {
        return Err(AppError::NotFound("Position not found".to_string()));
    };

    position.users = Some(
        users_by_position(pool, &[id])
            .await?
            .remove(&id)
            .unwrap_or_default(),
    );

    Ok(position)
}

#[instrument(skip(pool, position))]
pub async fn create_position(pool: &Pool<Sqlite>, position: &NewPosition) -> Result<i64, AppError> {
    info!("Creating position");
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO positions (name, description, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&position.name)
    .bind(&position.description)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(pool, changes))]
pub async fn update_position(
    pool: &Pool<Sqlite>,
    id: i64,
    changes: &PositionChanges,
) -> Result<(), AppError> {
    info!("Updating position");
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE positions SET updated_at = ");
    qb.push_bind(Utc::now());
    if let Some(name) = &changes.name {
        qb.push(", name = ").push_bind(name.clone());
    }
    if let Some(description) = &changes.description {
        qb.push(", description = ").push_bind(description.clone());
    }
    qb.push(" WHERE id = ").push_bind(id);

    let result = qb.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Position not found".to_string()));
    }

    Ok(())
}

/// Refused while any user still holds the position.
#[instrument(skip(pool))]
pub async fn delete_position(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting position");
    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM positions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Position not found".to_string()));
    }

    let holders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE position_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    if holders > 0 {
        warn!(holders = holders, "Position still assigned to users");
        return Err(AppError::Reference(
            "Cannot delete position with associated users".to_string(),
        ));
    }

    sqlx::query("DELETE FROM positions WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn users_by_position(
    pool: &Pool<Sqlite>,
    position_ids: &[i64],
) -> Result<HashMap<i64, Vec<UserSummary>>, AppError> {
    let mut grouped: HashMap<i64, Vec<UserSummary>> = HashMap::new();
    if position_ids.is_empty() {
        return Ok(grouped);
    }

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT position_id, id, email, role, firstname, lastname, middlename FROM users WHERE position_id",
    );
    push_id_list(&mut qb, position_ids);
    qb.push(" ORDER BY id");

    let members = qb.build_query_as::<PositionMember>().fetch_all(pool).await?;
    for member in members {
        grouped.entry(member.position_id).or_default().push(member.user);
    }

    Ok(grouped)
}
