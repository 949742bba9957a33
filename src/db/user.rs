use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Sqlite, SqliteConnection, Transaction};
use tracing::{info, instrument, warn};

use crate::auth::{Role, hash_password, verify_password};
use crate::error::AppError;
use crate::listing::{Criteria, FilterValue, PageRequest, Sort, SortFields, fetch_page, push_value};
use crate::models::{
    DependentsInput, NewUser, ProfileFields, USER_COLUMNS, User, UserChanges, UserDetail,
    normalize_email,
};

use super::dependents::{attach_details, ensure_subjects_exist, write_dependents};

pub const USER_SORT_FIELDS: SortFields = &[
    ("id", "id"),
    ("email", "email"),
    ("role", "role"),
    ("firstname", "firstname"),
    ("lastname", "lastname"),
    ("birthday", "birthday"),
    ("status", "status"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

pub const ADMIN_SORT_FIELDS: SortFields = &[
    ("id", "id"),
    ("email", "email"),
    ("firstname", "firstname"),
    ("lastname", "lastname"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

/// Name used in not-found messages for a role-scoped lookup.
fn entity_name(scope: Option<Role>) -> &'static str {
    match scope {
        Some(Role::Worker) => "Worker",
        Some(Role::Admin) => "Admin",
        None => "User",
    }
}

fn not_found(scope: Option<Role>) -> AppError {
    AppError::NotFound(format!("{} not found", entity_name(scope)))
}

#[instrument(skip(pool))]
pub async fn list_users(
    pool: &Pool<Sqlite>,
    criteria: &Criteria,
    sort: &Sort,
    page: &PageRequest,
) -> Result<(Vec<User>, i64), AppError> {
    info!("Listing users");
    fetch_page::<User>(pool, "users", USER_COLUMNS, criteria, sort, page).await
}

#[instrument(skip(pool))]
pub async fn list_user_details(
    pool: &Pool<Sqlite>,
    criteria: &Criteria,
    sort: &Sort,
    page: &PageRequest,
) -> Result<(Vec<UserDetail>, i64), AppError> {
    let (users, total) = list_users(pool, criteria, sort, page).await?;
    Ok((attach_details(pool, users).await?, total))
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64, scope: Option<Role>) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM users WHERE id = ", USER_COLUMNS));
    qb.push_bind(id);
    if let Some(role) = scope {
        qb.push(" AND role = ").push_bind(role);
    }

    match qb.build_query_as::<User>().fetch_optional(pool).await? {
        Some(user) => Ok(user),
        None => Err(not_found(scope)),
    }
}

#[instrument(skip(pool))]
pub async fn get_user_detail(
    pool: &Pool<Sqlite>,
    id: i64,
    scope: Option<Role>,
) -> Result<UserDetail, AppError> {
    let user = get_user(pool, id, scope).await?;
    attach_details(pool, vec![user])
        .await?
        .pop()
        .ok_or_else(|| not_found(scope))
}

/// Unknown email, wrong password and unusable hashes all come back as `None`.
#[instrument(skip(pool, password))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await?;

    let Some((id, password_hash)) = row else {
        warn!("Login attempt for unknown email");
        return Ok(None);
    };

    if !verify_password(password, &password_hash) {
        warn!(user_id = id, "Login attempt with wrong password");
        return Ok(None);
    }

    Ok(Some(get_user(pool, id, None).await?))
}

#[instrument(skip(pool))]
pub async fn count_admins(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(Role::Admin)
            .fetch_one(pool)
            .await?,
    )
}

async fn ensure_email_available(
    conn: &mut SqliteConnection,
    email: &str,
    except_id: Option<i64>,
) -> Result<(), AppError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND id != ?")
            .bind(email)
            .bind(except_id.unwrap_or(0))
            .fetch_optional(&mut *conn)
            .await?;

    if existing.is_some() {
        return Err(AppError::Validation("Email already in use".to_string()));
    }

    Ok(())
}

async fn ensure_references_exist(
    conn: &mut SqliteConnection,
    profile: &ProfileFields,
    dependents: &DependentsInput,
) -> Result<(), AppError> {
    if let Some(church_id) = profile.church_id {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM churches WHERE id = ?")
            .bind(church_id)
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_none() {
            return Err(AppError::NotFound("Church not found".to_string()));
        }
    }

    if let Some(position_id) = profile.position_id {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM positions WHERE id = ?")
            .bind(position_id)
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_none() {
            return Err(AppError::NotFound("Position not found".to_string()));
        }
    }

    if let Some(subjects) = &dependents.subjects {
        ensure_subjects_exist(conn, subjects).await?;
    }

    Ok(())
}

/// The email constraint can still fire if two creates race past the check.
fn unique_email_violation(err: sqlx::Error) -> AppError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => {
            AppError::Validation("Email already in use".to_string())
        }
        _ => AppError::Database(err),
    }
}

/// Inserts the user and its dependent collections in one transaction.
#[instrument(skip(pool, user), fields(email = %user.email))]
pub async fn create_user(pool: &Pool<Sqlite>, role: Role, user: &NewUser) -> Result<i64, AppError> {
    info!("Creating user");
    let password_hash = hash_password(&user.password)?;

    let tx = pool.begin().await?;
    insert_user(tx, role, user, password_hash).await
}

/// Creates the first admin account. The write lock is taken before the
/// admin count is read, so concurrent callers cannot both get through.
#[instrument(skip(pool, user), fields(email = %user.email))]
pub async fn create_first_admin(pool: &Pool<Sqlite>, user: &NewUser) -> Result<i64, AppError> {
    info!("Creating first admin");
    let password_hash = hash_password(&user.password)?;

    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
        .bind(Role::Admin)
        .fetch_one(&mut *tx)
        .await?;
    if admins > 0 {
        warn!("Admin already exists");
        return Err(AppError::Authentication(
            "Authentication required".to_string(),
        ));
    }

    insert_user(tx, Role::Admin, user, password_hash).await
}

async fn insert_user(
    mut tx: Transaction<'static, Sqlite>,
    role: Role,
    user: &NewUser,
    password_hash: String,
) -> Result<i64, AppError> {
    let email = normalize_email(&user.email);
    let now = Utc::now();

    ensure_email_available(&mut tx, &email, None).await?;
    ensure_references_exist(&mut tx, &user.profile, &user.dependents).await?;

    let mut columns: Vec<(&'static str, FilterValue)> = vec![
        ("email", email.into()),
        ("password", password_hash.into()),
        ("role", role.as_str().into()),
        ("created_at", now.into()),
        ("updated_at", now.into()),
    ];
    columns.extend(user.profile.assignments());

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("INSERT INTO users (");
    for (index, (column, _)) in columns.iter().enumerate() {
        if index > 0 {
            qb.push(", ");
        }
        qb.push(*column);
    }
    qb.push(") VALUES (");
    for (index, (_, value)) in columns.iter().enumerate() {
        if index > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, value);
    }
    qb.push(")");

    let result = qb
        .build()
        .execute(&mut *tx)
        .await
        .map_err(unique_email_violation)?;
    let user_id = result.last_insert_rowid();

    write_dependents(&mut tx, user_id, &user.dependents).await?;

    tx.commit().await?;

    info!(user_id = user_id, role = %role, "User created");
    Ok(user_id)
}

/// Applies the present scalar fields and replaces each present collection,
/// all in one transaction. A role change is only honoured when unscoped.
#[instrument(skip(pool, changes))]
pub async fn update_user(
    pool: &Pool<Sqlite>,
    id: i64,
    scope: Option<Role>,
    changes: &UserChanges,
) -> Result<(), AppError> {
    info!("Updating user");
    let password_hash = match &changes.password {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };
    let email = changes.email.as_deref().map(normalize_email);

    let mut tx = pool.begin().await?;

    let mut lookup: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT id FROM users WHERE id = ");
    lookup.push_bind(id);
    if let Some(role) = scope {
        lookup.push(" AND role = ").push_bind(role);
    }
    let found: Option<i64> = lookup
        .build_query_scalar()
        .fetch_optional(&mut *tx)
        .await?;
    if found.is_none() {
        return Err(not_found(scope));
    }

    if let Some(email) = &email {
        ensure_email_available(&mut tx, email, Some(id)).await?;
    }
    ensure_references_exist(&mut tx, &changes.profile, &changes.dependents).await?;

    let mut assignments: Vec<(&'static str, FilterValue)> = Vec::new();
    if let Some(email) = email {
        assignments.push(("email", email.into()));
    }
    if let Some(password_hash) = password_hash {
        assignments.push(("password", password_hash.into()));
    }
    if let (None, Some(role)) = (scope, changes.role) {
        assignments.push(("role", role.as_str().into()));
    }
    assignments.extend(changes.profile.assignments());

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE users SET updated_at = ");
    qb.push_bind(Utc::now());
    for (column, value) in &assignments {
        qb.push(", ").push(*column).push(" = ");
        push_value(&mut qb, value);
    }
    qb.push(" WHERE id = ").push_bind(id);

    qb.build()
        .execute(&mut *tx)
        .await
        .map_err(unique_email_violation)?;

    write_dependents(&mut tx, id, &changes.dependents).await?;

    tx.commit().await?;
    Ok(())
}

/// Dependent rows cascade with the user.
#[instrument(skip(pool))]
pub async fn delete_user(
    pool: &Pool<Sqlite>,
    id: i64,
    scope: Option<Role>,
) -> Result<(), AppError> {
    info!("Deleting user");
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("DELETE FROM users WHERE id = ");
    qb.push_bind(id);
    if let Some(role) = scope {
        qb.push(" AND role = ").push_bind(role);
    }

    let result = qb.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(not_found(scope));
    }

    Ok(())
}
