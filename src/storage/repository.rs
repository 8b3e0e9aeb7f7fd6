use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension};

use crate::model::Lookups;
use crate::snapshot::Snapshot;

/// Fixed key the bounded snapshot list is stored under.
pub const SNAPSHOT_CACHE_KEY: &str = "weekly-snapshots.v1";

/// Ordered, comma-separated status vocabulary.
pub const CONFIG_STATUS_KEYS: &str = "status_keys";
/// Comma-separated assignee ids on the internal team roster.
pub const CONFIG_ROSTER: &str = "roster";
/// JSON object mapping assignee id to display label.
pub const CONFIG_ASSIGNEE_LABELS: &str = "assignee_labels";
/// Base URL of the remote snapshot store; absent disables it.
pub const CONFIG_REMOTE_URL: &str = "remote_url";

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Lookups ────────────────────────────────────────────────────────

/// Assemble the session lookup tables from configuration.
///
/// Missing keys degrade to empty vocabulary/roster/labels; a malformed
/// label map is logged and treated as absent.
pub fn load_lookups(conn: &Connection) -> Result<Lookups, rusqlite::Error> {
    let status_keys = get_config(conn, CONFIG_STATUS_KEYS)?
        .map(|v| split_csv(&v))
        .unwrap_or_default();

    let roster: HashSet<String> = get_config(conn, CONFIG_ROSTER)?
        .map(|v| split_csv(&v).into_iter().collect())
        .unwrap_or_default();

    let labels: HashMap<String, String> = get_config(conn, CONFIG_ASSIGNEE_LABELS)?
        .and_then(|v| match serde_json::from_str(&v) {
            Ok(map) => Some(map),
            Err(e) => {
                log::warn!("ignoring malformed {CONFIG_ASSIGNEE_LABELS} config: {e}");
                None
            }
        })
        .unwrap_or_default();

    Ok(Lookups::new(status_keys, labels, roster))
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Snapshot cache ─────────────────────────────────────────────────

/// Read the cached snapshot list from under the fixed key.
///
/// A missing row and an unparseable blob both degrade to an empty list;
/// only real database errors propagate.
pub fn read_snapshot_cache(conn: &Connection) -> Result<Vec<Snapshot>, rusqlite::Error> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM snapshot_cache WHERE cache_key = ?1",
            params![SNAPSHOT_CACHE_KEY],
            |row| row.get(0),
        )
        .optional()?;

    let Some(body) = body else {
        return Ok(Vec::new());
    };
    match serde_json::from_str(&body) {
        Ok(snapshots) => Ok(snapshots),
        Err(e) => {
            log::warn!("snapshot cache unreadable, starting empty: {e}");
            Ok(Vec::new())
        }
    }
}

/// Replace the cached snapshot list. Last write wins.
pub fn write_snapshot_cache(
    conn: &Connection,
    snapshots: &[Snapshot],
) -> Result<(), rusqlite::Error> {
    let body = match serde_json::to_string(snapshots) {
        Ok(body) => body,
        Err(e) => {
            log::warn!("snapshot cache serialize failed, skipping write: {e}");
            return Ok(());
        }
    };
    conn.execute(
        "INSERT OR REPLACE INTO snapshot_cache (cache_key, body, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![SNAPSHOT_CACHE_KEY, body],
    )?;
    Ok(())
}
