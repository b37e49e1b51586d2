//! Database migrations
//!
//! Migrations are embedded as SQL strings and applied in version order. Applied
//! versions are tracked in `_migrations`, so running them again is a no-op.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// A schema migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique, increasing version number
    pub version: i32,
    pub name: &'static str,
    /// One or more `;`-separated statements
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_bank_accounts",
    up: r#"
        CREATE TABLE IF NOT EXISTS bank_accounts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            bank_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            access_token TEXT NOT NULL,
            funding_source_url TEXT NOT NULL CHECK (funding_source_url <> ''),
            shareable_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_bank_accounts_user ON bank_accounts(user_id);
        CREATE INDEX IF NOT EXISTS idx_bank_accounts_user_account ON bank_accounts(user_id, account_id);
    "#,
}];

/// Apply every pending migration, returning how many ran
pub async fn run_migrations(pool: &SqlitePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;
    for migration in MIGRATIONS {
        if !applied_versions.contains(&(migration.version as i64)) {
            tracing::info!("Applying migration {}: {}", migration.version, migration.name);
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &SqlitePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create migrations table")?;
    Ok(())
}

async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}
