//! Dependent collections owned by a user: children, educational attainment,
//! cases and subject links.
//!
//! Writes always run on the caller's transaction. A collection present in
//! the payload replaces the stored one wholesale; an absent collection is
//! not touched.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::models::{
    Case, ChurchSummary, Child, DependentsInput, EducationalAttainment, PositionSummary,
    SubjectSummary, User, UserDetail,
};

use super::push_id_list;

#[derive(sqlx::FromRow)]
struct SubjectLink {
    user_id: i64,
    #[sqlx(flatten)]
    subject: SubjectSummary,
}

/// Deduplicated subject ids, in ascending order.
pub fn distinct_ids(ids: &[i64]) -> Vec<i64> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

#[instrument(skip(conn))]
pub async fn ensure_subjects_exist(
    conn: &mut SqliteConnection,
    subject_ids: &[i64],
) -> Result<(), AppError> {
    let ids = distinct_ids(subject_ids);
    if ids.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM subjects WHERE id");
    push_id_list(&mut qb, &ids);

    let found: i64 = qb.build_query_scalar().fetch_one(&mut *conn).await?;
    if found != ids.len() as i64 {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    Ok(())
}

#[instrument(skip(conn, dependents))]
pub async fn write_dependents(
    conn: &mut SqliteConnection,
    user_id: i64,
    dependents: &DependentsInput,
) -> Result<(), AppError> {
    let now = Utc::now();

    if let Some(children) = &dependents.children {
        clear(conn, "user_children", user_id).await?;
        if !children.is_empty() {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO user_children
                 (user_id, firstname, lastname, middlename, birthday, gender, created_at, updated_at) ",
            );
            qb.push_values(children, |mut row, child| {
                row.push_bind(user_id)
                    .push_bind(child.firstname.clone())
                    .push_bind(child.lastname.clone())
                    .push_bind(child.middlename.clone())
                    .push_bind(child.birthday)
                    .push_bind(child.gender)
                    .push_bind(now)
                    .push_bind(now);
            });
            qb.build().execute(&mut *conn).await?;
        }
        debug!(count = children.len(), "Replaced children");
    }

    if let Some(attainments) = &dependents.educational_attainment {
        clear(conn, "user_educational_attainments", user_id).await?;
        if !attainments.is_empty() {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO user_educational_attainments
                 (user_id, schoolname, education, created_at, updated_at) ",
            );
            qb.push_values(attainments, |mut row, attainment| {
                row.push_bind(user_id)
                    .push_bind(attainment.schoolname.clone())
                    .push_bind(attainment.education.clone())
                    .push_bind(now)
                    .push_bind(now);
            });
            qb.build().execute(&mut *conn).await?;
        }
        debug!(count = attainments.len(), "Replaced educational attainment");
    }

    if let Some(cases) = &dependents.cases {
        clear(conn, "user_cases", user_id).await?;
        if !cases.is_empty() {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO user_cases
                 (user_id, year, place, case_name, reason, created_at, updated_at) ",
            );
            qb.push_values(cases, |mut row, case| {
                row.push_bind(user_id)
                    .push_bind(case.year)
                    .push_bind(case.place.clone())
                    .push_bind(case.case_name.clone())
                    .push_bind(case.reason.clone())
                    .push_bind(now)
                    .push_bind(now);
            });
            qb.build().execute(&mut *conn).await?;
        }
        debug!(count = cases.len(), "Replaced cases");
    }

    if let Some(subjects) = &dependents.subjects {
        clear(conn, "user_subjects", user_id).await?;
        let ids = distinct_ids(subjects);
        if !ids.is_empty() {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO user_subjects (user_id, subject_id, created_at, updated_at) ",
            );
            qb.push_values(&ids, |mut row, subject_id| {
                row.push_bind(user_id)
                    .push_bind(*subject_id)
                    .push_bind(now)
                    .push_bind(now);
            });
            qb.build().execute(&mut *conn).await?;
        }
        debug!(count = ids.len(), "Replaced subject links");
    }

    Ok(())
}

async fn clear(conn: &mut SqliteConnection, table: &str, user_id: i64) -> Result<(), AppError> {
    sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?", table))
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Loads relations and dependent collections for `users`, keeping order.
#[instrument(skip_all, fields(users = users.len()))]
pub async fn attach_details(
    pool: &Pool<Sqlite>,
    users: Vec<User>,
) -> Result<Vec<UserDetail>, AppError> {
    if users.is_empty() {
        return Ok(Vec::new());
    }

    let user_ids: Vec<i64> = users.iter().map(|u| u.id).collect();
    let church_ids = distinct_ids(&users.iter().filter_map(|u| u.church_id).collect::<Vec<_>>());
    let position_ids =
        distinct_ids(&users.iter().filter_map(|u| u.position_id).collect::<Vec<_>>());

    let churches: HashMap<i64, ChurchSummary> = by_id::<ChurchSummary>(
        pool,
        "SELECT id, address, latitude, longitude FROM churches WHERE id",
        &church_ids,
        "id",
    )
    .await?
    .into_iter()
    .map(|c| (c.id, c))
    .collect();

    let positions: HashMap<i64, PositionSummary> = by_id::<PositionSummary>(
        pool,
        "SELECT id, name, description FROM positions WHERE id",
        &position_ids,
        "id",
    )
    .await?
    .into_iter()
    .map(|p| (p.id, p))
    .collect();

    let mut children = group(
        by_id::<Child>(
            pool,
            "SELECT id, user_id, firstname, lastname, middlename, birthday, gender, created_at, updated_at
             FROM user_children WHERE user_id",
            &user_ids,
            "id",
        )
        .await?,
        |c| c.user_id,
    );

    let mut attainments = group(
        by_id::<EducationalAttainment>(
            pool,
            "SELECT id, user_id, schoolname, education, created_at, updated_at
             FROM user_educational_attainments WHERE user_id",
            &user_ids,
            "id",
        )
        .await?,
        |e| e.user_id,
    );

    let mut cases = group(
        by_id::<Case>(
            pool,
            "SELECT id, user_id, year, place, case_name, reason, created_at, updated_at
             FROM user_cases WHERE user_id",
            &user_ids,
            "id",
        )
        .await?,
        |c| c.user_id,
    );

    let mut subjects: HashMap<i64, Vec<SubjectSummary>> = HashMap::new();
    for link in by_id::<SubjectLink>(
        pool,
        "SELECT us.user_id, s.id, s.name, s.description, s.disabled
         FROM user_subjects us JOIN subjects s ON s.id = us.subject_id WHERE us.user_id",
        &user_ids,
        "s.id",
    )
    .await?
    {
        subjects.entry(link.user_id).or_default().push(link.subject);
    }

    Ok(users
        .into_iter()
        .map(|user| {
            let id = user.id;
            UserDetail {
                church: user.church_id.and_then(|c| churches.get(&c).cloned()),
                position: user.position_id.and_then(|p| positions.get(&p).cloned()),
                subjects: subjects.remove(&id).unwrap_or_default(),
                children: children.remove(&id).unwrap_or_default(),
                educational_attainment: attainments.remove(&id).unwrap_or_default(),
                cases: cases.remove(&id).unwrap_or_default(),
                user,
            }
        })
        .collect())
}

/// Runs `select` (ending in an id column) against `ids`.
async fn by_id<T>(
    pool: &Pool<Sqlite>,
    select: &str,
    ids: &[i64],
    order_by: &str,
) -> Result<Vec<T>, AppError>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(select);
    push_id_list(&mut qb, ids);
    qb.push(" ORDER BY ").push(order_by);

    Ok(qb.build_query_as::<T>().fetch_all(pool).await?)
}

fn group<T>(rows: Vec<T>, key: impl Fn(&T) -> i64) -> HashMap<i64, Vec<T>> {
    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(&row)).or_default().push(row);
    }
    grouped
}
