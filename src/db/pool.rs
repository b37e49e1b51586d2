//! SQLite connection pool

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Open a SQLite pool for `url`.
///
/// Accepts `sqlite:` URLs, bare file paths and `:memory:`. Parent directories
/// of file databases are created on demand. An in-memory database is private
/// to its connection, so it gets a single-connection pool.
pub async fn create_pool(url: &str) -> Result<SqlitePool> {
    let in_memory = url == ":memory:" || url.starts_with("sqlite::memory:");

    if !in_memory {
        let path = url.strip_prefix("sqlite:").unwrap_or(url);
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
            }
        }
    }

    let connection_url = if url == ":memory:" {
        "sqlite::memory:".to_string()
    } else if url.starts_with("sqlite:") {
        if url.contains('?') {
            url.to_string()
        } else {
            format!("{}?mode=rwc", url)
        }
    } else {
        format!("sqlite:{}?mode=rwc", url)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 10 })
        .connect(&connection_url)
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

    Ok(pool)
}

/// In-memory database for tests
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(":memory:").await
}
