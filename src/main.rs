use climate_river::{AppConfig, AppState, Database, Environment, MonitoringConfig, MonitoringSystem};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    init_tracing(config.environment);

    tracing::info!(environment = ?config.environment, "starting climate-river");

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    let pool = database.pool();

    let monitoring = MonitoringSystem::new(MonitoringConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to build monitoring system: {e}"))?;
    monitoring.start_background_monitoring(MonitoringConfig::default(), pool.clone());

    let state = AppState::new(&config, pool, monitoring).await?;
    let app = climate_river::create_router(state);

    let bind_address = config.server.bind_address();
    tracing::info!(%bind_address, "listening");

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(environment: Environment) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if environment.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}
