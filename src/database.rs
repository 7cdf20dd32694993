use crate::config::DatabaseSettings;
use sqlx::{PgPool, Pool, Postgres};

pub type DatabasePool = Pool<Postgres>;

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connection_timeout)
            .idle_timeout(settings.idle_timeout)
            .connect(&settings.url)
            .await?;

        Ok(Database { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> DatabasePool {
        self.pool.clone()
    }
}