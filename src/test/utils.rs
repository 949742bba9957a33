use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Once;

use chrono::NaiveDate;
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::auth::Role;
use crate::config::AppConfig;
use crate::db::{create_church, create_position, create_subject, create_user};
use crate::error::AppError;
use crate::init_rocket;
use crate::models::{NewChurch, NewPosition, NewSubject, NewUser, ProfileFields};

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "password123";

/// One connection so every query sees the same in-memory database.
pub async fn test_pool() -> Pool<Sqlite> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid sqlite url")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        auth_secret: "test-secret".to_string(),
        session_max_age_days: 30,
    }
}

pub fn new_user(email: &str, first: &str, last: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        password: STANDARD_PASSWORD.to_string(),
        confirm_password: None,
        role: None,
        profile: ProfileFields {
            firstname: Some(first.to_string()),
            lastname: Some(last.to_string()),
            birthday: NaiveDate::from_ymd_opt(1990, 1, 1),
            ..Default::default()
        },
        dependents: Default::default(),
    }
}

#[derive(Default)]
pub struct TestDbBuilder {
    users: Vec<(Role, String, String, String)>,
    churches: Vec<String>,
    positions: Vec<String>,
    subjects: Vec<String>,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admin(mut self, email: &str, first: &str, last: &str) -> Self {
        self.users
            .push((Role::Admin, email.to_string(), first.to_string(), last.to_string()));
        self
    }

    pub fn worker(mut self, email: &str, first: &str, last: &str) -> Self {
        self.users
            .push((Role::Worker, email.to_string(), first.to_string(), last.to_string()));
        self
    }

    pub fn church(mut self, address: &str) -> Self {
        self.churches.push(address.to_string());
        self
    }

    pub fn position(mut self, description: &str) -> Self {
        self.positions.push(description.to_string());
        self
    }

    pub fn subject(mut self, description: &str) -> Self {
        self.subjects.push(description.to_string());
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter("warn")
                .try_init();
        });

        let pool = test_pool().await;
        let mut ids = HashMap::new();

        for (role, email, first, last) in &self.users {
            let id = create_user(&pool, *role, &new_user(email, first, last)).await?;
            ids.insert(email.clone(), id);
        }

        for address in &self.churches {
            let church = NewChurch {
                address: address.clone(),
                latitude: 14,
                longitude: 121,
                images: Vec::new(),
            };
            ids.insert(address.clone(), create_church(&pool, &church).await?);
        }

        for description in &self.positions {
            let position = NewPosition {
                name: None,
                description: description.clone(),
            };
            ids.insert(description.clone(), create_position(&pool, &position).await?);
        }

        for description in &self.subjects {
            let subject = NewSubject {
                name: None,
                description: description.clone(),
                disabled: false,
            };
            ids.insert(description.clone(), create_subject(&pool, &subject).await?);
        }

        Ok(TestDb { pool, ids })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    ids: HashMap<String, i64>,
}

impl TestDb {
    /// Id of a seeded row, keyed by email, address or description.
    pub fn id(&self, key: &str) -> i64 {
        self.ids[key]
    }
}

/// Admin and worker accounts most tests start from.
pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .admin("admin@example.com", "Ada", "Admin")
        .worker("worker@example.com", "Wes", "Worker")
        .build()
        .await
        .expect("Failed to build test database")
}

pub async fn setup_test_client(test_db: &TestDb) -> Client {
    Client::tracked(init_rocket(test_db.pool.clone(), &test_config()))
        .await
        .expect("valid rocket instance")
}

pub async fn login_test_user(client: &Client, email: &str, password: &str) -> Status {
    client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(json!({ "email": email, "password": password }).to_string())
        .dispatch()
        .await
        .status()
}

pub async fn login_admin(client: &Client) {
    let status = login_test_user(client, "admin@example.com", STANDARD_PASSWORD).await;
    assert_eq!(status, Status::Ok);
}
