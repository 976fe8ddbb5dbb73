//! Concrete implementations of the port traits.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_export;
pub mod report;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod universe_adapter;
pub mod xlsx_adapter;
pub mod yahoo_adapter;
