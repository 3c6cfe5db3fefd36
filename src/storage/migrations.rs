use rusqlite::{params, types::FromSqlError, Connection, Transaction};
use tracing::{debug, info};

use crate::error::{KizamiError, Result};

use super::sqlite::{decode_time, encode_time};

const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Brings the schema up to [CURRENT_SCHEMA_VERSION]. Files created by older versions of the tool
/// carry `user_version = 0` but may already contain the three tables, so every step must tolerate
/// existing data.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(KizamiError::Migration(format!(
            "database version ({version}) is newer than supported schema ({CURRENT_SCHEMA_VERSION})"
        )));
    }

    let tx = conn.transaction()?;

    if version == CURRENT_SCHEMA_VERSION {
        // Older versions of the tool may have written to the file since it was migrated.
        normalize_timestamps(&tx)?;
        tx.commit()?;
        return Ok(());
    }

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        debug!("Migrating schema to version {next_version}");
        apply_migration(&tx, next_version)?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;

    info!("Database schema migrated to version {CURRENT_SCHEMA_VERSION}");
    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => {
            tx.execute_batch(include_str!("schemas/schema_v1.sql"))?;
            Ok(())
        }
        2 => {
            tx.execute_batch(include_str!("schemas/schema_v2.sql"))?;
            Ok(())
        }
        3 => normalize_timestamps(tx),
        _ => Err(KizamiError::Migration(format!(
            "unknown migration target version: {version}"
        ))),
    }
}

/// Rewrites every timestamp into the canonical UTC text form. Older files carry offsets and
/// nanoseconds. Runs as migration 3 and again on every later open.
fn normalize_timestamps(tx: &Transaction<'_>) -> Result<()> {
    let mut rows = Vec::new();
    {
        let mut stmt = tx.prepare("SELECT id, started_at, stopped_at FROM kizami")?;
        let mut query = stmt.query([])?;
        while let Some(row) = query.next()? {
            let id: i64 = row.get(0)?;
            let started_at: String = row.get(1)?;
            let stopped_at: String = row.get(2)?;
            rows.push((id, started_at, stopped_at));
        }
    }

    let mut rewritten = 0;
    for (id, started_at, stopped_at) in rows {
        let unreadable = |value: &str, e: FromSqlError| {
            KizamiError::Migration(format!("kizami {id}: unreadable timestamp '{value}': {e}"))
        };
        let started = decode_time(&started_at).map_err(|e| unreadable(&started_at, e))?;
        let stopped = decode_time(&stopped_at).map_err(|e| unreadable(&stopped_at, e))?;
        let (started, stopped) = (encode_time(started), encode_time(stopped));
        if started != started_at || stopped != stopped_at {
            tx.execute(
                "UPDATE kizami SET started_at = ?1, stopped_at = ?2 WHERE id = ?3",
                params![started, stopped, id],
            )?;
            rewritten += 1;
        }
    }

    if rewritten > 0 {
        info!("Normalized timestamps of {rewritten} kizami");
    }
    Ok(())
}
