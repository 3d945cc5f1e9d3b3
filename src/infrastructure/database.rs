//! Pooled SQLite connection

use crate::infrastructure::settings::Settings;
use di::{Ref, inject, injectable};
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::RwLock;

/// Pool handed out instead of the configured one while tests are running.
static TEST_POOL: RwLock<Option<SqlitePool>> = RwLock::new(None);

pub struct DatabaseConnection {
    connection: SqlitePool,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> DatabaseConnection {
        if let Some(pool) = Self::test_pool() {
            return DatabaseConnection { connection: pool };
        }

        // The URL is validated in `main` before the provider is built.
        let options = SqliteConnectOptions::from_str(&settings.database_url)
            .expect("DATABASE_URL must be a valid sqlite URL")
            .create_if_missing(true);

        info!("using database {}", settings.database_url);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_lazy_with(options);

        DatabaseConnection { connection: pool }
    }

    pub fn from_pool(pool: SqlitePool) -> DatabaseConnection {
        DatabaseConnection { connection: pool }
    }

    /// Makes every DI-created connection share `pool`.
    pub fn set_test_pool(pool: SqlitePool) {
        if let Ok(mut slot) = TEST_POOL.write() {
            *slot = Some(pool);
        }
    }

    pub fn clear_test_pool() {
        if let Ok(mut slot) = TEST_POOL.write() {
            *slot = None;
        }
    }

    fn test_pool() -> Option<SqlitePool> {
        TEST_POOL.read().ok().and_then(|slot| slot.clone())
    }
}

impl Deref for DatabaseConnection {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for DatabaseConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}
