/*!
 * Store Types
 * Store layouts and errors
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store operation result
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable store errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum StoreError {
    #[error("Document has no string key at '{0}'")]
    MissingKey(String),

    #[error("Unique index '{index}' violated by value {value}")]
    ConstraintViolation { index: String, value: String },

    #[error("Unknown index '{0}'")]
    UnknownIndex(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Secondary index declared at open time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    /// Field the index reads; defaults to the index name
    pub key_path: String,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key_path: name.clone(),
            name,
            unique: false,
        }
    }

    pub fn with_key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = key_path.into();
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Store layout: name, primary key field and secondary indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub name: String,
    pub key_path: String,
    pub version: u32,
    pub indexes: Vec<IndexSpec>,
}

impl StoreConfig {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            version: 1,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }
}
