use std::{
  fs,
  path::{Path, PathBuf},
  sync::Arc,
  time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::DatasetManifest;

#[derive(Debug, Clone)]
pub struct StorageOptions {
  /// Path to the SQLite file. If None, defaults to ~/.shardview/storage.sqlite
  /// (or %USERPROFILE% on Windows).
  pub sqlite_path: Option<PathBuf>,
}

impl Default for StorageOptions {
  fn default() -> Self {
    Self { sqlite_path: None }
  }
}

/// Recents and last-opened store shared with the shell. A narrow collaborator:
/// the engine writes to it once per manifest load, and its failures never fail
/// a load.
#[derive(Clone)]
pub struct Storage {
  conn: Arc<Mutex<Connection>>,
}

/// One recents row, denormalized from the manifest summary so the shell can
/// render the list without re-reading any manifest document.
#[derive(Debug, Clone)]
pub struct RecentManifest {
  pub path: String,
  pub display_name: String,
  pub shard_count: u32,
  pub record_total: u64,
  pub compression: Option<String>,
  pub last_opened_at_ms: i64,
}

impl Storage {
  pub fn new(opts: StorageOptions) -> Result<Self, String> {
    let path = opts.sqlite_path.unwrap_or_else(default_sqlite_path);

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    let conn = Connection::open(&path).map_err(|e| e.to_string())?;
    migrate(&conn).map_err(|e| e.to_string())?;
    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Record that a manifest was opened, replacing any previous row for the
  /// same path.
  pub fn touch_recent(&self, manifest: &DatasetManifest) -> Result<(), String> {
    let display_name = Path::new(&manifest.manifest_path)
      .file_name()
      .and_then(|s| s.to_str())
      .unwrap_or(manifest.manifest_path.as_str())
      .to_string();
    let record_total: u64 = manifest.shards.iter().map(|s| s.record_count as u64).sum();

    let conn = self.conn.lock();
    conn
      .execute(
        r#"
INSERT INTO recent_manifests(path, display_name, shard_count, record_total, compression, last_opened_at)
VALUES(?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(path) DO UPDATE SET
  display_name=excluded.display_name,
  shard_count=excluded.shard_count,
  record_total=excluded.record_total,
  compression=excluded.compression,
  last_opened_at=excluded.last_opened_at
        "#,
        params![
          manifest.manifest_path,
          display_name,
          manifest.shards.len() as i64,
          record_total as i64,
          manifest.compression.as_deref(),
          now_ms()
        ],
      )
      .map_err(|e| e.to_string())?;
    Ok(())
  }

  pub fn list_recent(&self, limit: usize) -> Result<Vec<RecentManifest>, String> {
    let conn = self.conn.lock();
    let mut stmt = conn
      .prepare(
        r#"
SELECT path, display_name, shard_count, record_total, compression, last_opened_at
FROM recent_manifests
ORDER BY last_opened_at DESC
LIMIT ?1
        "#,
      )
      .map_err(|e| e.to_string())?;

    let rows = stmt
      .query_map(params![limit as i64], |row| {
        Ok(RecentManifest {
          path: row.get(0)?,
          display_name: row.get(1)?,
          shard_count: row.get::<_, i64>(2)? as u32,
          record_total: row.get::<_, i64>(3)? as u64,
          compression: row.get(4)?,
          last_opened_at_ms: row.get(5)?,
        })
      })
      .map_err(|e| e.to_string())?;

    let mut out = Vec::new();
    for r in rows {
      out.push(r.map_err(|e| e.to_string())?);
    }
    Ok(out)
  }

  pub fn set_last_opened(&self, path: &str) -> Result<(), String> {
    let conn = self.conn.lock();
    conn
      .execute(
        r#"
INSERT INTO settings(key, value)
VALUES('last_opened_path', ?1)
ON CONFLICT(key) DO UPDATE SET value=excluded.value
        "#,
        params![path],
      )
      .map_err(|e| e.to_string())?;
    Ok(())
  }

  pub fn last_opened(&self) -> Result<Option<String>, String> {
    let conn = self.conn.lock();
    conn
      .query_row(
        "SELECT value FROM settings WHERE key='last_opened_path'",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| e.to_string())
  }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
  conn.execute_batch(
    r#"
CREATE TABLE IF NOT EXISTS recent_manifests(
  path TEXT PRIMARY KEY,
  display_name TEXT NOT NULL,
  shard_count INTEGER NOT NULL,
  record_total INTEGER NOT NULL,
  compression TEXT,
  last_opened_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS settings(
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);
    "#,
  )?;
  Ok(())
}

fn default_sqlite_path() -> PathBuf {
  let base = std::env::var_os("HOME")
    .or_else(|| std::env::var_os("USERPROFILE"))
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("."));
  base.join(".shardview").join("storage.sqlite")
}

fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as i64
}
