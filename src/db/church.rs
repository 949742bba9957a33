use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::listing::{Criteria, PageRequest, Sort, SortFields, fetch_page};
use crate::models::{Church, ChurchChanges, ChurchImage, DbChurch, NewChurch, NewChurchImage};

use super::push_id_list;

pub const CHURCH_SORT_FIELDS: SortFields = &[
    ("id", "id"),
    ("address", "address"),
    ("latitude", "latitude"),
    ("longitude", "longitude"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

const CHURCH_COLUMNS: &str = "id, address, latitude, longitude, created_at, updated_at";

#[instrument(skip(pool))]
pub async fn list_churches(
    pool: &Pool<Sqlite>,
    criteria: &Criteria,
    sort: &Sort,
    page: &PageRequest,
) -> Result<(Vec<Church>, i64), AppError> {
    info!("Listing churches");
    let (rows, total) =
        fetch_page::<DbChurch>(pool, "churches", CHURCH_COLUMNS, criteria, sort, page).await?;

    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let mut images = images_by_church(pool, &ids).await?;

    let churches = rows
        .into_iter()
        .map(|row| {
            let church_images = images.remove(&row.id).unwrap_or_default();
            row.with_images(church_images)
        })
        .collect();

    Ok((churches, total))
}

#[instrument(skip(pool))]
pub async fn get_church(pool: &Pool<Sqlite>, id: i64) -> Result<Church, AppError> {
    info!("Fetching church by ID");
    let row = sqlx::query_as::<_, DbChurch>(
        "SELECT id, address, latitude, longitude, created_at, updated_at FROM churches WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(church) => {
            let images = images_by_church(pool, &[id])
                .await?
                .remove(&id)
                .unwrap_or_default();
            Ok(church.with_images(images))
        }
        None => Err(AppError::NotFound("Church not found".to_string())),
    }
}

#[instrument(skip(pool, church))]
pub async fn create_church(pool: &Pool<Sqlite>, church: &NewChurch) -> Result<i64, AppError> {
    info!(images = church.images.len(), "Creating church");
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO churches (address, latitude, longitude, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&church.address)
    .bind(church.latitude)
    .bind(church.longitude)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let church_id = result.last_insert_rowid();
    insert_images(&mut tx, church_id, &church.images).await?;

    tx.commit().await?;

    info!(church_id = church_id, "Church created");
    Ok(church_id)
}

#[instrument(skip(pool, changes))]
pub async fn update_church(
    pool: &Pool<Sqlite>,
    id: i64,
    changes: &ChurchChanges,
) -> Result<(), AppError> {
    info!("Updating church");
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE churches SET updated_at = ");
    qb.push_bind(now);
    if let Some(address) = &changes.address {
        qb.push(", address = ").push_bind(address.clone());
    }
    if let Some(latitude) = changes.latitude {
        qb.push(", latitude = ").push_bind(latitude);
    }
    if let Some(longitude) = changes.longitude {
        qb.push(", longitude = ").push_bind(longitude);
    }
    qb.push(" WHERE id = ").push_bind(id);

    let result = qb.build().execute(&mut *tx).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Church not found".to_string()));
    }

    if let Some(images) = &changes.images {
        sqlx::query("DELETE FROM church_images WHERE church_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_images(&mut tx, id, images).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Images cascade with the church; its users are detached.
#[instrument(skip(pool))]
pub async fn delete_church(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting church");
    let result = sqlx::query("DELETE FROM churches WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Church not found".to_string()));
    }

    Ok(())
}

async fn insert_images(
    conn: &mut SqliteConnection,
    church_id: i64,
    images: &[NewChurchImage],
) -> Result<(), AppError> {
    if images.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("INSERT INTO church_images (image, church_id, created_at, updated_at) ");
    qb.push_values(images, |mut row, image| {
        row.push_bind(image.image.clone())
            .push_bind(church_id)
            .push_bind(now)
            .push_bind(now);
    });

    qb.build().execute(&mut *conn).await?;
    Ok(())
}

async fn images_by_church(
    pool: &Pool<Sqlite>,
    church_ids: &[i64],
) -> Result<HashMap<i64, Vec<ChurchImage>>, AppError> {
    let mut grouped: HashMap<i64, Vec<ChurchImage>> = HashMap::new();
    if church_ids.is_empty() {
        return Ok(grouped);
    }

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT id, image, church_id, created_at, updated_at FROM church_images WHERE church_id",
    );
    push_id_list(&mut qb, church_ids);
    qb.push(" ORDER BY id");

    let images = qb.build_query_as::<ChurchImage>().fetch_all(pool).await?;
    for image in images {
        grouped.entry(image.church_id).or_default().push(image);
    }

    Ok(grouped)
}
