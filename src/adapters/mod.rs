//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod rule_script_compiler;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
