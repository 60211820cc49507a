//! Contract between the ingest layer and the storage engine that persists
//! artifacts.
//!
//! The engine owns durability, indexing, and shape/type enforcement. The ingest
//! layer always calls a `create_*` method before writing to the returned handle
//! and never writes to the same location twice within one call.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ElementType, ObjectType};
use crate::error::SomaError;
use crate::frame::{DataFrame, Schema};
use crate::matrix::{CoordinateTable, DenseArray};

/// Engine-specific options passed through unchanged on every create call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformConfig(Map<String, Value>);

impl PlatformConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Anything created by the engine: it has a location and a kind.
pub trait SomaObject: fmt::Debug {
    fn uri(&self) -> &str;
    fn object_type(&self) -> ObjectType;
}

pub trait DataFrameHandle: SomaObject {
    fn schema(&self) -> &Schema;
    fn index_column_names(&self) -> &[String];
    fn write(&mut self, frame: &DataFrame) -> Result<(), SomaError>;
}

pub trait DenseArrayHandle: SomaObject {
    fn element_type(&self) -> ElementType;
    fn shape(&self) -> &[u64];
    fn write(&mut self, array: &DenseArray) -> Result<(), SomaError>;
}

pub trait SparseArrayHandle: SomaObject {
    fn element_type(&self) -> ElementType;
    fn shape(&self) -> &[u64];
    fn write(&mut self, coords: &CoordinateTable) -> Result<(), SomaError>;
}

pub trait StorageEngine: Send + Sync {
    type Collection: SomaObject;
    type DataFrame: DataFrameHandle;
    type DenseArray: DenseArrayHandle;
    type SparseArray: SparseArrayHandle;

    fn create_collection(
        &self,
        uri: &str,
        kind: ObjectType,
        config: &PlatformConfig,
    ) -> Result<Self::Collection, SomaError>;

    fn create_dataframe(
        &self,
        uri: &str,
        schema: &Schema,
        index_column_names: &[String],
        config: &PlatformConfig,
    ) -> Result<Self::DataFrame, SomaError>;

    fn create_dense_array(
        &self,
        uri: &str,
        element_type: ElementType,
        shape: &[u64],
        config: &PlatformConfig,
    ) -> Result<Self::DenseArray, SomaError>;

    fn create_sparse_array(
        &self,
        uri: &str,
        element_type: ElementType,
        shape: &[u64],
        config: &PlatformConfig,
    ) -> Result<Self::SparseArray, SomaError>;
}

/// Checks shared by the bundled engines before accepting a write.
pub(crate) fn check_frame_matches(schema: &Schema, frame: &DataFrame) -> Result<(), SomaError> {
    let columns = frame.column_names().collect::<Vec<_>>();
    if columns != schema.names() {
        return Err(SomaError::Storage(format!(
            "columns {columns:?} do not match schema {:?}",
            schema.names()
        )));
    }
    for (field, column) in schema.fields.iter().zip(frame.columns()) {
        if column.values.element_type() != Some(field.element_type) {
            return Err(SomaError::Storage(format!(
                "column '{}' is not {}",
                field.name, field.element_type
            )));
        }
    }
    Ok(())
}

pub(crate) fn check_dense_matches(
    element_type: ElementType,
    shape: &[u64],
    array: &DenseArray,
) -> Result<(), SomaError> {
    if array.shape() != shape {
        return Err(SomaError::Storage(format!(
            "array shape {:?} does not match {shape:?}",
            array.shape()
        )));
    }
    if array.element_type() != element_type {
        return Err(SomaError::Storage(format!(
            "array type {} does not match {element_type}",
            array.element_type()
        )));
    }
    Ok(())
}

pub(crate) fn check_coords_match(
    element_type: ElementType,
    shape: &[u64],
    coords: &CoordinateTable,
) -> Result<(), SomaError> {
    if coords.soma_data.element_type() != element_type {
        return Err(SomaError::Storage(format!(
            "data type {} does not match {element_type}",
            coords.soma_data.element_type()
        )));
    }
    let n = coords.len();
    if coords.soma_dim_0.len() != n || coords.soma_dim_1.len() != n {
        return Err(SomaError::Storage(
            "coordinate and data columns differ in length".to_string(),
        ));
    }
    let in_bounds = |value: i64, extent: u64| value >= 0 && (value as u64) < extent;
    let outside = coords
        .soma_dim_0
        .iter()
        .zip(&coords.soma_dim_1)
        .find(|(r, c)| !in_bounds(**r, shape[0]) || !in_bounds(**c, shape[1]));
    if let Some((r, c)) = outside {
        return Err(SomaError::Storage(format!(
            "coordinate ({r}, {c}) outside shape {shape:?}"
        )));
    }
    Ok(())
}

pub(crate) fn check_new_uri(uri: &str) -> Result<(), SomaError> {
    if uri.trim().is_empty() {
        return Err(SomaError::Storage("empty uri".to_string()));
    }
    Ok(())
}

pub(crate) fn check_sparse_shape(shape: &[u64]) -> Result<(), SomaError> {
    if shape.len() != 2 {
        return Err(SomaError::Storage(format!(
            "sparse arrays are two-dimensional, got shape {shape:?}"
        )));
    }
    Ok(())
}

pub(crate) fn check_array_type(element_type: ElementType) -> Result<(), SomaError> {
    if !element_type.is_numeric() {
        return Err(SomaError::Storage(format!(
            "arrays cannot hold {element_type} values"
        )));
    }
    Ok(())
}
