//! Dataset handling for the filter panel
//!
//! Records, scalar values and their sort keys, the append-only record store
//! and column schema inference.

pub mod config;
pub mod record;
pub mod schema;
pub mod store;
pub mod value;

use thiserror::Error;

// Re-exports
pub use config::MissingValues;
pub use record::{Record, RecordId};
pub use schema::{Column, ColumnStats, ColumnType, Schema};
pub use store::RecordStore;
pub use value::{Key, Value};

/// Errors that can occur in data operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("field '{0}' does not exist in any known column")]
    UnknownField(String),

    #[error("duplicate record id {0}")]
    DuplicateId(RecordId),
}
