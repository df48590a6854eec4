//! SQLite persistence for script strategy records.

use crate::domain::error::StrategistError;
use crate::domain::script::ScriptRecord;
use crate::domain::strategy::StrategyKind;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StrategyStorePort;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

fn query_err(e: rusqlite::Error) -> StrategistError {
    StrategistError::DatabaseQuery {
        reason: e.to_string(),
    }
}

pub struct SqliteStrategyStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStrategyStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StrategistError> {
        let db_path =
            config
                .get_string("store", "path")
                .ok_or_else(|| StrategistError::ConfigMissing {
                    section: "store".into(),
                    key: "path".into(),
                })?;
        let pool_size = config.get_int("store", "pool_size", 4).max(1) as u32;

        let store = Self::build(SqliteConnectionManager::file(&db_path), pool_size)?;
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StrategistError> {
        let store = Self::build(SqliteConnectionManager::memory(), 1)?;
        store.initialize_schema()?;
        Ok(store)
    }

    fn build(manager: SqliteConnectionManager, size: u32) -> Result<Self, StrategistError> {
        let pool = Pool::builder()
            .max_size(size)
            .build(manager)
            .map_err(|e: r2d2::Error| StrategistError::Database {
                reason: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StrategistError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| StrategistError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), StrategistError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS strategy (
                    name TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    script TEXT NOT NULL,
                    enabled INTEGER NOT NULL,
                    namespace TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                );",
            )
            .map_err(query_err)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScriptRecord> {
        let kind: String = row.get(1)?;
        let kind = kind.parse::<StrategyKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(ScriptRecord {
            name: row.get(0)?,
            kind,
            script: row.get(2)?,
            enabled: row.get(3)?,
            namespace: row.get(4)?,
        })
    }

    fn expect_changed(changed: usize, name: &str) -> Result<(), StrategistError> {
        if changed == 0 {
            return Err(StrategistError::NotFound {
                what: format!("strategy '{name}'"),
            });
        }
        Ok(())
    }
}

impl StrategyStorePort for SqliteStrategyStore {
    fn get(&self, name: &str) -> Result<Option<ScriptRecord>, StrategistError> {
        self.conn()?
            .query_row(
                "SELECT name, kind, script, enabled, namespace FROM strategy WHERE name = ?1",
                params![name],
                Self::row_to_record,
            )
            .optional()
            .map_err(query_err)
    }

    fn list_all(&self) -> Result<Vec<ScriptRecord>, StrategistError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name, kind, script, enabled, namespace FROM strategy ORDER BY name")
            .map_err(query_err)?;
        let rows = stmt.query_map([], Self::row_to_record).map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(query_err)?);
        }
        Ok(records)
    }

    fn insert(&self, record: &ScriptRecord) -> Result<(), StrategistError> {
        self.conn()?
            .execute(
                "INSERT INTO strategy (name, kind, script, enabled, namespace)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.name,
                    record.kind.to_string(),
                    record.script,
                    record.enabled,
                    record.namespace
                ],
            )
            .map_err(|e| StrategistError::Database {
                reason: format!("insert of '{}' failed: {}", record.name, e),
            })?;
        Ok(())
    }

    fn update_script(
        &self,
        name: &str,
        script: &str,
        enabled: bool,
        namespace: &str,
    ) -> Result<(), StrategistError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE strategy
                 SET script = ?2, enabled = ?3, namespace = ?4, updated_at = CURRENT_TIMESTAMP
                 WHERE name = ?1",
                params![name, script, enabled, namespace],
            )
            .map_err(query_err)?;
        Self::expect_changed(changed, name)
    }

    fn update_enabled(&self, name: &str, enabled: bool) -> Result<(), StrategistError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE strategy SET enabled = ?2, updated_at = CURRENT_TIMESTAMP WHERE name = ?1",
                params![name, enabled],
            )
            .map_err(query_err)?;
        Self::expect_changed(changed, name)
    }

    fn delete(&self, name: &str) -> Result<(), StrategistError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM strategy WHERE name = ?1", params![name])
            .map_err(query_err)?;
        Self::expect_changed(changed, name)
    }
}
