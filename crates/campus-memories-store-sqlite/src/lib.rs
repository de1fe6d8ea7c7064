use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use campus_memories_core::{KeyValueStorage, StorageError};
use rusqlite::{params, Connection, DatabaseName, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv_entries (
  key TEXT PRIMARY KEY CHECK (length(key) > 0),
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

/// Durable key-value storage in a single `SQLite` database file.
pub struct SqliteKeyValueStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub entries: i64,
    /// Total size of all stored values in bytes.
    pub value_bytes: i64,
    pub schema_status: SchemaStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntrySummary {
    pub key: String,
    pub value_bytes: i64,
    pub updated_at: String,
}

impl SqliteKeyValueStore {
    /// Open a `SQLite`-backed key-value store and configure runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails,
    /// or when the database was written by a newer schema.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            let tx = self.conn.transaction().context("failed to start migration v1 transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            record_schema_version(&tx, 1)?;
            tx.commit().context("failed to commit migration v1")?;
            debug!("applied kv storage migration v1");
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Read the full value stored under `key`.
    ///
    /// # Errors
    /// Returns an error when the query fails (for example before `migrate`).
    pub fn read(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv_entries WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("failed to read kv entry {key}"))
    }

    /// Replace the full value stored under `key`.
    ///
    /// # Errors
    /// Returns an error when the upsert fails.
    pub fn write(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO kv_entries(key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("failed to write kv entry {key}"))?;
        debug!(key, bytes = value.len(), "kv entry written");
        Ok(())
    }

    /// Delete `key`. Returns whether an entry existed.
    ///
    /// # Errors
    /// Returns an error when the delete statement fails.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
            .with_context(|| format!("failed to remove kv entry {key}"))?;
        Ok(changed > 0)
    }

    /// Summaries of every stored entry, ordered by key.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub fn entries(&self) -> Result<Vec<EntrySummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT key, length(CAST(value AS BLOB)), updated_at
                 FROM kv_entries ORDER BY key ASC",
            )
            .context("failed to prepare kv entry listing")?;
        let rows = stmt.query_map([], |row| {
            Ok(EntrySummary {
                key: row.get(0)?,
                value_bytes: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.context("failed to decode kv entry summary")?);
        }
        Ok(entries)
    }

    /// Copy the whole database to `out_file` and return how many kv entries it
    /// holds.
    ///
    /// # Errors
    /// Returns an error when the store is not migrated, the parent directory
    /// cannot be created, or the `SQLite` backup fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<i64> {
        let entries = self.entry_count().context("cannot back up an unmigrated kv store")?;
        if let Some(parent) = out_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create backup directory for {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to back up kv store to {}", out_file.display()))?;
        debug!(entries, path = %out_file.display(), "kv store backed up");
        Ok(entries)
    }

    /// Replace this database with a backup taken by [`Self::backup_database`],
    /// migrate it, and return the restored entry count.
    ///
    /// Files without a `kv_entries` table are refused before anything is
    /// overwritten.
    ///
    /// # Errors
    /// Returns an error when the file is missing or is not a kv store backup,
    /// or when the restore or migration fails.
    pub fn restore_database(&mut self, in_file: &Path) -> Result<i64> {
        if !in_file.exists() {
            return Err(anyhow!("backup file does not exist: {}", in_file.display()));
        }
        ensure_kv_backup(in_file)?;

        self.conn
            .restore(DatabaseName::Main, in_file, None::<fn(rusqlite::backup::Progress)>)
            .with_context(|| format!("failed to restore kv store from {}", in_file.display()))?;

        self.migrate()?;
        let entries = self.entry_count()?;
        debug!(entries, path = %in_file.display(), "kv store restored");
        Ok(entries)
    }

    /// `PRAGMA quick_check` plus entry totals and schema status.
    ///
    /// # Errors
    /// Returns an error when any of the queries fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let schema_status = self.schema_status()?;
        let (entries, value_bytes) = if schema_status.current_version >= 1 {
            self.conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(length(CAST(value AS BLOB))), 0)
                     FROM kv_entries",
                    [],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
                .context("failed to total kv entries")?
        } else {
            (0, 0)
        };

        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            entries,
            value_bytes,
            schema_status,
        })
    }

    fn entry_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM kv_entries", [], |row| row.get::<_, i64>(0))
            .context("failed to count kv entries")
    }
}

fn ensure_kv_backup(path: &Path) -> Result<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open backup file {}", path.display()))?;
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'kv_entries'",
            [],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to inspect backup file {}", path.display()))?;
    if tables == 0 {
        return Err(anyhow!("{} is not a kv store backup (no kv_entries table)", path.display()));
    }
    Ok(())
}

impl KeyValueStorage for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.read(key).map_err(|err| StorageError::Read {
            key: key.to_string(),
            message: format!("{err:#}"),
        })
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(key, value).map_err(|err| StorageError::Write {
            key: key.to_string(),
            message: format!("{err:#}"),
        })
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}
