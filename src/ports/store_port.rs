//! Persistence port for script strategy records.

use crate::domain::error::StrategistError;
use crate::domain::script::ScriptRecord;

pub trait StrategyStorePort: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<ScriptRecord>, StrategistError>;

    fn list_all(&self) -> Result<Vec<ScriptRecord>, StrategistError>;

    /// Fails with `Database` when a record with the same name exists.
    fn insert(&self, record: &ScriptRecord) -> Result<(), StrategistError>;

    fn update_script(
        &self,
        name: &str,
        script: &str,
        enabled: bool,
        namespace: &str,
    ) -> Result<(), StrategistError>;

    fn update_enabled(&self, name: &str, enabled: bool) -> Result<(), StrategistError>;

    fn delete(&self, name: &str) -> Result<(), StrategistError>;
}
