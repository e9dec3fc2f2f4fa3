
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

const BUILD_COLUMNS: &str = "id, repository_url, collection, status, chunk_count, symbol_count, \
                             failed_files, error_message, started_at, finished_at";

pub struct IndexBuildQueries;

impl IndexBuildQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_build: NewIndexBuild) -> Result<IndexBuild> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO index_builds (id, repository_url, collection, status, started_at) \
             VALUES (?, ?, ?, 'running', ?)",
        )
        .bind(&new_build.id)
        .bind(&new_build.repository_url)
        .bind(&new_build.collection)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create index build")?;

        Self::get_by_id(pool, &new_build.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created index build"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<IndexBuild>> {
        let query = format!("SELECT {BUILD_COLUMNS} FROM index_builds WHERE id = ?");
        let result = sqlx::query_as::<_, IndexBuild>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get index build by id")?;

        Ok(result)
    }

    /// Mark a build completed and record its per-file failures in one
    /// transaction
    #[inline]
    pub async fn complete(
        pool: &SqlitePool,
        id: &str,
        completion: &BuildCompletion,
    ) -> Result<IndexBuild> {
        let now = Utc::now().naive_utc();
        let failed_files = i64::try_from(completion.failures.len()).unwrap_or(i64::MAX);

        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        for failure in &completion.failures {
            sqlx::query("INSERT INTO build_failures (build_id, path, message) VALUES (?, ?, ?)")
                .bind(id)
                .bind(&failure.path)
                .bind(&failure.message)
                .execute(&mut *tx)
                .await
                .context("Failed to record build failure")?;
        }

        let updated = sqlx::query(
            "UPDATE index_builds \
             SET status = 'completed', chunk_count = ?, symbol_count = ?, failed_files = ?, \
                 error_message = NULL, finished_at = ? \
             WHERE id = ?",
        )
        .bind(completion.chunk_count)
        .bind(completion.symbol_count)
        .bind(failed_files)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to complete index build")?
        .rows_affected();

        if updated == 0 {
            return Err(anyhow::anyhow!("Index build {id} does not exist"));
        }

        tx.commit().await.context("Failed to commit build completion")?;
        debug!("Marked build {} completed", id);

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve completed index build"))
    }

    #[inline]
    pub async fn fail(pool: &SqlitePool, id: &str, message: &str) -> Result<()> {
        let now = Utc::now().naive_utc();
        let updated = sqlx::query(
            "UPDATE index_builds SET status = 'failed', error_message = ?, finished_at = ? \
             WHERE id = ?",
        )
        .bind(message)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark index build failed")?
        .rows_affected();

        if updated == 0 {
            warn!("Tried to fail unknown index build {}", id);
        }
        Ok(())
    }

    /// Most recent successful build for a collection
    #[inline]
    pub async fn latest_completed(
        pool: &SqlitePool,
        collection: &str,
    ) -> Result<Option<IndexBuild>> {
        let query = format!(
            "SELECT {BUILD_COLUMNS} FROM index_builds \
             WHERE collection = ? AND status = 'completed' \
             ORDER BY finished_at DESC LIMIT 1"
        );
        let result = sqlx::query_as::<_, IndexBuild>(&query)
            .bind(collection)
            .fetch_optional(pool)
            .await
            .context("Failed to get latest completed build")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<IndexBuild>> {
        let query = format!(
            "SELECT {BUILD_COLUMNS} FROM index_builds ORDER BY started_at DESC LIMIT ?"
        );
        let builds = sqlx::query_as::<_, IndexBuild>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
            .context("Failed to list index builds")?;

        Ok(builds)
    }

    /// Builds left `running` by a process that died are marked failed
    #[inline]
    pub async fn fail_interrupted(pool: &SqlitePool) -> Result<u64> {
        let now = Utc::now().naive_utc();
        let affected = sqlx::query(
            "UPDATE index_builds \
             SET status = 'failed', error_message = 'interrupted', finished_at = ? \
             WHERE status = 'running'",
        )
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to clean up interrupted builds")?
        .rows_affected();

        if affected > 0 {
            warn!("Marked {} interrupted index builds as failed", affected);
        }
        Ok(affected)
    }
}

pub struct BuildFailureQueries;

impl BuildFailureQueries {
    #[inline]
    pub async fn list_for_build(pool: &SqlitePool, build_id: &str) -> Result<Vec<BuildFailure>> {
        let failures = sqlx::query_as::<_, BuildFailure>(
            "SELECT id, build_id, path, message FROM build_failures \
             WHERE build_id = ? ORDER BY id",
        )
        .bind(build_id)
        .fetch_all(pool)
        .await
        .context("Failed to list build failures")?;

        Ok(failures)
    }
}
