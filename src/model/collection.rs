//! Collection references and field type resolution
//!
//! A collection reference is supplied once per request and is read-only
//! to the engine.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::{ExploreError, ExploreResult};

/// Storage location and well-known field paths of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReference {
    /// Public collection name
    pub collection_name: String,
    /// Index (document backend) or table (relational backend) name
    pub index_name: String,
    /// Path of the unique identifier
    pub id_path: String,
    /// Path of the record geometry
    pub geometry_path: String,
    /// Path of the record centroid (a point)
    pub centroid_path: String,
    /// Path of the record timestamp
    pub timestamp_path: String,
    /// Storage format of the timestamp (default: epoch_millis)
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Additional named paths surfaced on every hit
    #[serde(default)]
    pub custom_paths: BTreeMap<String, String>,
}

fn default_timestamp_format() -> String {
    "epoch_millis".to_string()
}

impl CollectionReference {
    /// Creates a reference with the default timestamp format
    pub fn new(
        collection_name: impl Into<String>,
        index_name: impl Into<String>,
        id_path: impl Into<String>,
        geometry_path: impl Into<String>,
        centroid_path: impl Into<String>,
        timestamp_path: impl Into<String>,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            index_name: index_name.into(),
            id_path: id_path.into(),
            geometry_path: geometry_path.into(),
            centroid_path: centroid_path.into(),
            timestamp_path: timestamp_path.into(),
            timestamp_format: default_timestamp_format(),
            custom_paths: BTreeMap::new(),
        }
    }

    /// Adds a custom path surfaced on hits
    pub fn with_custom_path(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.custom_paths.insert(name.into(), path.into());
        self
    }
}

/// Field types known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Keyword,
    Long,
    Integer,
    Short,
    Byte,
    Double,
    Float,
    Date,
    Boolean,
    GeoPoint,
    GeoShape,
    Point,
    #[serde(rename = "linestring")]
    LineString,
    Polygon,
    #[serde(rename = "multipoint")]
    MultiPoint,
    #[serde(rename = "multilinestring")]
    MultiLineString,
    #[serde(rename = "multipolygon")]
    MultiPolygon,
    Object,
}

impl FieldType {
    /// Returns true for date fields
    pub fn is_date(&self) -> bool {
        matches!(self, FieldType::Date)
    }

    /// Returns true for numeric fields
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Long
                | FieldType::Integer
                | FieldType::Short
                | FieldType::Byte
                | FieldType::Double
                | FieldType::Float
        )
    }

    /// Returns true for fields that support spatial predicates
    pub fn is_geometry(&self) -> bool {
        matches!(
            self,
            FieldType::GeoPoint
                | FieldType::GeoShape
                | FieldType::Point
                | FieldType::LineString
                | FieldType::Polygon
                | FieldType::MultiPoint
                | FieldType::MultiLineString
                | FieldType::MultiPolygon
        )
    }

    /// Returns true for point fields
    pub fn is_point(&self) -> bool {
        matches!(self, FieldType::GeoPoint | FieldType::Point)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Long => "long",
            FieldType::Integer => "integer",
            FieldType::Short => "short",
            FieldType::Byte => "byte",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::GeoPoint => "geo_point",
            FieldType::GeoShape => "geo_shape",
            FieldType::Point => "point",
            FieldType::LineString => "linestring",
            FieldType::Polygon => "polygon",
            FieldType::MultiPoint => "multipoint",
            FieldType::MultiLineString => "multilinestring",
            FieldType::MultiPolygon => "multipolygon",
            FieldType::Object => "object",
        }
    }
}

/// Resolves the type of a field path inside a collection
pub trait FieldTypeResolver: Send + Sync {
    /// Returns the type of `path`, or NOT_FOUND
    fn field_type(&self, collection: &CollectionReference, path: &str) -> ExploreResult<FieldType>;
}

/// Resolver backed by a fixed path → type map
#[derive(Debug, Clone, Default)]
pub struct StaticFieldTypes {
    types: HashMap<String, FieldType>,
}

impl StaticFieldTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field
    pub fn with_field(mut self, path: impl Into<String>, field_type: FieldType) -> Self {
        self.types.insert(path.into(), field_type);
        self
    }
}

impl<K: Into<String>> FromIterator<(K, FieldType)> for StaticFieldTypes {
    fn from_iter<I: IntoIterator<Item = (K, FieldType)>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().map(|(k, t)| (k.into(), t)).collect(),
        }
    }
}

impl FieldTypeResolver for StaticFieldTypes {
    fn field_type(&self, collection: &CollectionReference, path: &str) -> ExploreResult<FieldType> {
        self.types
            .get(path)
            .copied()
            .ok_or_else(|| ExploreError::unknown_field(path, &collection.collection_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExploreErrorCode;

    fn collection() -> CollectionReference {
        CollectionReference::new("flights", "flights_idx", "id", "track", "position", "timestamp")
    }

    #[test]
    fn test_field_type_predicates() {
        assert!(FieldType::GeoPoint.is_point());
        assert!(FieldType::GeoPoint.is_geometry());
        assert!(FieldType::MultiPolygon.is_geometry());
        assert!(!FieldType::MultiPolygon.is_point());
        assert!(FieldType::Float.is_numeric());
        assert!(!FieldType::Date.is_numeric());
        assert!(!FieldType::Keyword.is_geometry());
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticFieldTypes::new()
            .with_field("position", FieldType::GeoPoint)
            .with_field("speed", FieldType::Double);

        assert_eq!(
            resolver.field_type(&collection(), "speed").unwrap(),
            FieldType::Double
        );
        let err = resolver.field_type(&collection(), "altitude").unwrap_err();
        assert_eq!(err.code(), ExploreErrorCode::NotFound);
    }

    #[test]
    fn test_field_type_serde_names() {
        let t: FieldType = serde_json::from_str("\"geo_point\"").unwrap();
        assert_eq!(t, FieldType::GeoPoint);
        let t: FieldType = serde_json::from_str("\"multilinestring\"").unwrap();
        assert_eq!(t, FieldType::MultiLineString);
        assert_eq!(FieldType::LineString.as_str(), "linestring");
    }

    #[test]
    fn test_reference_defaults() {
        let json = r#"{
            "collection_name": "flights",
            "index_name": "flights_idx",
            "id_path": "id",
            "geometry_path": "track",
            "centroid_path": "position",
            "timestamp_path": "timestamp"
        }"#;
        let reference: CollectionReference = serde_json::from_str(json).unwrap();
        assert_eq!(reference.timestamp_format, "epoch_millis");
        assert!(reference.custom_paths.is_empty());
    }
}
