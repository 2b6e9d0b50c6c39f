//! Profile store schema. Applied versions are recorded in `_migrations`.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "profiles",
        sql: r#"
            CREATE TABLE IF NOT EXISTS profiles (
                identity_id TEXT PRIMARY KEY,
                email TEXT,
                onboarding_step TEXT NOT NULL DEFAULT 'church',
                church_id TEXT,
                weekly_cap TEXT,
                bank_connected INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "profiles_step_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_profiles_onboarding_step
                ON profiles(onboarding_step);
        "#,
    },
];

/// Apply every migration newer than the recorded version, in order.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("_migrations table: {e}")))?;

    let mut version = get_current_version(conn).await?;
    let current = version;
    for migration in MIGRATIONS.iter().filter(move |m| m.version > current) {
        apply(conn, migration).await?;
        version = migration.version;
    }
    tracing::info!(version, "Profile schema up to date");
    Ok(())
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    tracing::info!(version = migration.version, name = migration.name, "Applying migration");
    let failed = |e: libsql::Error| {
        DatabaseError::Migration(format!("V{} ({}): {e}", migration.version, migration.name))
    };
    conn.execute_batch(migration.sql).await.map_err(failed)?;
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![migration.version, migration.name],
    )
    .await
    .map_err(failed)?;
    Ok(())
}

/// Highest applied version, 0 on a fresh database.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("reading schema version: {e}")))?;
    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("reading schema version: {e}")))?
    else {
        return Ok(0);
    };
    row.get(0)
        .map_err(|e| DatabaseError::Migration(format!("reading schema version: {e}")))
}
