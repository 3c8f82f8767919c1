//! Persistence interface: migrations and row storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// A row to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub table: String,
    pub fields: serde_json::Value,
}

impl Record {
    pub fn new(table: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            table: table.into(),
            fields,
        }
    }
}

/// Backend-agnostic storage. Calls may be slow.
#[async_trait]
pub trait Database: Send + Sync {
    /// Apply all pending schema migrations.
    async fn apply_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert a single record.
    async fn insert(&self, record: &Record) -> Result<(), DatabaseError>;
}
