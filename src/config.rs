//! Engine configuration
//!
//! A JSON file naming the backend, the paging limit and the collections the
//! engine may compile requests for, each with its declared field types:
//!
//! ```json
//! {
//!   "backend": "sql",
//!   "max_page_size": 1000,
//!   "collections": [{
//!     "collection_name": "flights", "index_name": "flights",
//!     "id_path": "id", "geometry_path": "track",
//!     "centroid_path": "position", "timestamp_path": "timestamp",
//!     "fields": {"id": "keyword", "track": "linestring",
//!                "position": "point", "timestamp": "date"}
//!   }]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{ExploreError, ExploreResult};
use crate::executor::DEFAULT_MAX_PAGE_SIZE;
use crate::model::{CollectionReference, FieldType, FieldTypeResolver};
use crate::planner::CompilerContext;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Backend requests are compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Document-search JSON DSL
    #[default]
    Search,
    /// Parameterised SQL
    Sql,
}

fn is_scalar(field_type: &FieldType) -> bool {
    !field_type.is_geometry()
}

/// A collection reference with its field types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(flatten)]
    pub reference: CollectionReference,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
}

impl CollectionConfig {
    fn validate(&self) -> ConfigResult<()> {
        let reference = &self.reference;
        let name = &reference.collection_name;
        let check = |role: &str, path: &str, suitable: fn(&FieldType) -> bool, expected: &str| {
            match self.fields.get(path) {
                None => Err(ConfigError::Invalid(format!(
                    "collection '{}': {} path '{}' is not declared in fields",
                    name, role, path
                ))),
                Some(t) if !suitable(t) => Err(ConfigError::Invalid(format!(
                    "collection '{}': {} path '{}' must be {}, not {}",
                    name,
                    role,
                    path,
                    expected,
                    t.as_str()
                ))),
                Some(_) => Ok(()),
            }
        };

        if name.trim().is_empty() || reference.index_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "collection_name and index_name must not be empty".to_string(),
            ));
        }
        check("id", &reference.id_path, is_scalar, "a non-geometry field")?;
        check("geometry", &reference.geometry_path, FieldType::is_geometry, "a geometry")?;
        check("centroid", &reference.centroid_path, FieldType::is_point, "a point")?;
        check("timestamp", &reference.timestamp_path, FieldType::is_date, "a date")?;
        Ok(())
    }

    /// Compiler context over this collection
    pub fn context(&self) -> CompilerContext {
        CompilerContext::new(Arc::new(self.reference.clone()), Arc::new(self.clone()))
    }
}

impl FieldTypeResolver for CollectionConfig {
    fn field_type(&self, collection: &CollectionReference, path: &str) -> ExploreResult<FieldType> {
        self.fields
            .get(path)
            .copied()
            .ok_or_else(|| ExploreError::unknown_field(path, &collection.collection_name))
    }
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Largest `from + size` of a search
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            collections: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Reads and validates a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates a config document
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "max_page_size must be positive".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for collection in &self.collections {
            if !names.insert(collection.reference.collection_name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate collection '{}'",
                    collection.reference.collection_name
                )));
            }
            collection.validate()?;
        }
        Ok(())
    }

    pub fn collection(&self, name: &str) -> ExploreResult<&CollectionConfig> {
        self.collections
            .iter()
            .find(|c| c.reference.collection_name == name)
            .ok_or_else(|| ExploreError::not_found(format!("Collection '{}' not found", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExploreErrorCode;

    const CONFIG: &str = r#"{
        "backend": "sql",
        "collections": [{
            "collection_name": "flights",
            "index_name": "flights_tbl",
            "id_path": "id",
            "geometry_path": "track",
            "centroid_path": "position",
            "timestamp_path": "timestamp",
            "custom_paths": {"operator": "airline"},
            "fields": {
                "id": "keyword",
                "airline": "keyword",
                "track": "linestring",
                "position": "point",
                "timestamp": "date"
            }
        }]
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = EngineConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.backend, BackendKind::Sql);
        assert_eq!(config.max_page_size, DEFAULT_MAX_PAGE_SIZE);

        let flights = config.collection("flights").unwrap();
        assert_eq!(flights.reference.index_name, "flights_tbl");
        assert_eq!(flights.reference.timestamp_format, "epoch_millis");
        assert_eq!(flights.reference.custom_paths["operator"], "airline");
    }

    #[test]
    fn test_resolver() {
        let config = EngineConfig::from_json(CONFIG).unwrap();
        let flights = config.collection("flights").unwrap();
        assert_eq!(
            flights.field_type(&flights.reference, "track").unwrap(),
            FieldType::LineString
        );
        let err = flights.field_type(&flights.reference, "speed").unwrap_err();
        assert_eq!(err.code(), ExploreErrorCode::NotFound);
        assert_eq!(
            config.collection("ships").unwrap_err().code(),
            ExploreErrorCode::NotFound
        );
    }

    #[test]
    fn test_centroid_must_be_point() {
        let bad = CONFIG.replace("\"position\": \"point\"", "\"position\": \"polygon\"");
        let err = EngineConfig::from_json(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("centroid")));
    }

    #[test]
    fn test_undeclared_path() {
        let bad = CONFIG.replace("\"timestamp\": \"date\"", "\"when\": \"date\"");
        assert!(matches!(
            EngineConfig::from_json(&bad),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_page_size() {
        let err = EngineConfig::from_json(r#"{"max_page_size": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
