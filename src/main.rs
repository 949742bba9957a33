use church_admin::config::AppConfig;
use church_admin::env::load_environment;
use church_admin::telemetry::init_tracing;
use church_admin::{Error, db, init_rocket};
use tracing::info;

#[rocket::main]
async fn main() -> Result<(), Error> {
    load_environment()?;
    let _otel_guard = init_tracing();

    let config = AppConfig::load()?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let _rocket = init_rocket(pool, &config).launch().await?;

    info!("Shut down cleanly");
    Ok(())
}
