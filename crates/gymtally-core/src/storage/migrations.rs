//! Database schema migrations for gymtally.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    // Ensure schema_version table exists
    create_schema_version_table(conn)?;

    // Get current version
    let current_version = get_schema_version(conn);

    // Apply migrations sequentially
    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT version FROM schema_version",
        [],
        |row| row.get::<_, i32>(0),
    )
    .unwrap_or_else(|e| {
        // If table doesn't exist or query fails, return 0
        if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            0
        } else {
            eprintln!("Warning: failed to read schema_version: {}", e);
            0
        }
    })
}

/// Set the schema version in the database.
fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    // Delete any existing version
    conn.execute("DELETE FROM schema_version", [])?;

    // Insert new version
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;

    Ok(())
}

/// Migration v1: Initial schema (baseline).
///
/// This migration represents the original schema before any migrations were
/// tracked. It's a no-op since the tables are created by Database::migrate()
/// directly.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    // Mark as v1 (tables already exist)
    set_schema_version(conn, 1)?;
    Ok(())
}

/// Migration v2: Link streaks to external frequency plans.
///
/// Adds `linked_frequency_id` to the streaks table so a streak can mirror
/// a habit plan managed outside this system. NULL means unlinked.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE streaks ADD COLUMN linked_frequency_id TEXT;",
    )?;

    // Mark as v2
    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [2],
    )?;

    tx.commit()?;
    Ok(())
}

/// Migration v3: Per-day dedup guard for weekly goals.
///
/// Adds `last_assist_date` to weekly_goals. Before this column existed a
/// replayed attendance fact could count the same day twice within a week;
/// the guard records the last counted gym-local day. Existing rows start
/// unset, which only means their next visit always counts.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE weekly_goals ADD COLUMN last_assist_date TEXT;",
    )?;

    // Mark as v3
    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [3],
    )?;

    tx.commit()?;
    Ok(())
}
