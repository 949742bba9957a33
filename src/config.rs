use rocket::figment::providers::{Env, Serialized};
use rocket::figment::{self, Figment};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://church-admin.db?mode=rwc";
pub const DEFAULT_SESSION_MAX_AGE_DAYS: i64 = 30;

const CONFIG_KEYS: [&str; 3] = ["database_url", "auth_secret", "session_max_age_days"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub auth_secret: String,
    pub session_max_age_days: i64,
}

impl AppConfig {
    /// Defaults, then `ROCKET_`-prefixed variables, then plain ones.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::default("database_url", DEFAULT_DATABASE_URL))
            .merge(Serialized::default(
                "session_max_age_days",
                DEFAULT_SESSION_MAX_AGE_DAYS,
            ))
            .merge(Env::prefixed("ROCKET_").only(&CONFIG_KEYS))
            .merge(Env::raw().only(&CONFIG_KEYS))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(&Self::figment())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, figment::Error> {
        let config: AppConfig = figment.extract()?;

        if config.auth_secret.trim().is_empty() {
            return Err(figment::Error::from(
                "auth_secret must not be empty".to_string(),
            ));
        }

        if config.session_max_age_days < 1 {
            return Err(figment::Error::from(
                "session_max_age_days must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}
