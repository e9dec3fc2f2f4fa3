
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexBuild {
    pub id: String,
    pub repository_url: String,
    pub collection: String,
    pub status: BuildStatus,
    pub chunk_count: i64,
    pub symbol_count: i64,
    pub failed_files: i64,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum BuildStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for BuildStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            BuildStatus::Running => write!(f, "Running"),
            BuildStatus::Completed => write!(f, "Completed"),
            BuildStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIndexBuild {
    pub id: String,
    pub repository_url: String,
    pub collection: String,
}

/// Counts recorded when a build finishes successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuildCompletion {
    pub chunk_count: i64,
    pub symbol_count: i64,
    pub failures: Vec<NewBuildFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BuildFailure {
    pub id: i64,
    pub build_id: String,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBuildFailure {
    pub path: String,
    pub message: String,
}

impl IndexBuild {
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == BuildStatus::Completed
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == BuildStatus::Running
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == BuildStatus::Failed
    }

    /// Wall-clock duration, if the build has finished
    #[inline]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }
}
