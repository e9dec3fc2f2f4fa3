use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    BuildCompletion, BuildFailure, IndexBuild, NewIndexBuild,
};
use crate::database::sqlite::queries::{BuildFailureQueries, IndexBuildQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Build history and per-file parse failures
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    // Index build operations
    #[inline]
    pub async fn start_build(&self, new_build: NewIndexBuild) -> Result<IndexBuild> {
        IndexBuildQueries::create(&self.pool, new_build).await
    }

    #[inline]
    pub async fn complete_build(
        &self,
        id: &str,
        completion: &BuildCompletion,
    ) -> Result<IndexBuild> {
        IndexBuildQueries::complete(&self.pool, id, completion).await
    }

    #[inline]
    pub async fn fail_build(&self, id: &str, message: &str) -> Result<()> {
        IndexBuildQueries::fail(&self.pool, id, message).await
    }

    #[inline]
    pub async fn latest_completed_build(&self, collection: &str) -> Result<Option<IndexBuild>> {
        IndexBuildQueries::latest_completed(&self.pool, collection).await
    }

    #[inline]
    pub async fn recent_builds(&self, limit: i64) -> Result<Vec<IndexBuild>> {
        IndexBuildQueries::list_recent(&self.pool, limit).await
    }

    #[inline]
    pub async fn fail_interrupted_builds(&self) -> Result<u64> {
        IndexBuildQueries::fail_interrupted(&self.pool).await
    }

    // Build failure operations
    #[inline]
    pub async fn build_failures(&self, build_id: &str) -> Result<Vec<BuildFailure>> {
        BuildFailureQueries::list_for_build(&self.pool, build_id).await
    }
}
