//! Versioned schema migrations for the postgres backend.
//!
//! Applied versions are recorded in `schema_migrations`. On startup every migration with a
//! version above the highest recorded one runs in its own transaction together with its
//! bookkeeping row.

use std::path::Path;

use anyhow::Context;
use tokio_postgres::Client;

pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "create books table",
    sql: "
        CREATE TABLE IF NOT EXISTS books (
            id              BIGSERIAL PRIMARY KEY,
            title           TEXT NOT NULL,
            author          TEXT NOT NULL,
            quantity        BIGINT NOT NULL DEFAULT 0
            )
        ",
}];

/// Migrations newer than `applied_version`, in the order they must run
pub fn pending_migrations(
    migrations: &[Migration],
    applied_version: i32,
) -> Vec<&Migration> {
    let mut pending: Vec<&Migration> = migrations
        .iter()
        .filter(|migration| migration.version > applied_version)
        .collect();
    pending.sort_by_key(|migration| migration.version);
    pending
}

pub async fn run_migrations(client: &mut Client) -> anyhow::Result<()> {
    client
        .batch_execute(
            "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version         INTEGER PRIMARY KEY,
            description     TEXT NOT NULL,
            applied_at      TIMESTAMPTZ NOT NULL DEFAULT now()
            )
        ",
        )
        .await
        .context("Failed to setup schema_migrations table")?;

    let applied_version: i32 = client
        .query_one(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            &[],
        )
        .await
        .context("Failed to read applied migrations")?
        .try_get(0)?;

    for migration in pending_migrations(MIGRATIONS, applied_version) {
        let transaction = client.transaction().await?;
        transaction
            .batch_execute(migration.sql)
            .await
            .with_context(|| format!("Migration {} failed", migration.version))?;
        transaction
            .execute(
                "INSERT INTO schema_migrations (version, description) VALUES ($1, $2)",
                &[&migration.version, &migration.description],
            )
            .await?;
        transaction.commit().await?;
        tracing::info!(
            "Applied migration {}: {}",
            migration.version,
            migration.description
        );
    }
    Ok(())
}

/// Splits a script into statements. Lines are joined with a space and a statement ends at a line
/// ending with `;`. Text after the last `;` is dropped.
pub fn split_sql_statements(script: &str) -> Vec<String> {
    let mut statements = vec![];
    let mut query = String::new();
    for line in script.lines() {
        if line.trim().is_empty() {
            continue;
        }
        query.push_str(line);
        query.push(' ');
        if line.trim_end().ends_with(';') {
            statements.push(std::mem::take(&mut query).trim().to_string());
        }
    }
    statements
}

/// Executes a seed script statement by statement, returns the number of statements run
pub async fn run_seed_script(client: &Client, path: &Path) -> anyhow::Result<usize> {
    let script = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed script {}", path.display()))?;

    let statements = split_sql_statements(&script);
    for statement in &statements {
        client
            .batch_execute(statement)
            .await
            .with_context(|| format!("Seed statement failed: {}", statement))?;
    }
    tracing::info!(
        "Executed {} statements from {}",
        statements.len(),
        path.display()
    );
    Ok(statements.len())
}
