// Database module
// SQLite records build history, LanceDB holds the chunk vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
