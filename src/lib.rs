#[macro_use]
extern crate rocket;

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod env;
pub mod error;
pub mod listing;
pub mod models;
pub mod telemetry;
pub mod validation;

#[cfg(test)]
mod test;

use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use auth::SessionKeys;
use config::AppConfig;
use error::AppError;
use telemetry::TelemetryFairing;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Figment(#[from] rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("Environment error: {0}")]
    Env(#[from] dotenvy::Error),
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

pub fn init_rocket(pool: SqlitePool, config: &AppConfig) -> Rocket<Build> {
    info!("Starting church admin service");

    rocket::build()
        .manage(pool)
        .manage(SessionKeys::from_config(config))
        .mount("/api", api::routes())
        .register("/", api::catchers())
        .attach(TelemetryFairing)
}
