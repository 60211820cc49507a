use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SomaError;

/// Element types the storage engine can hold.
///
/// `Utf8` is only valid for data frame columns; arrays are numeric or boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Bool,
    Uint8,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
}

impl ElementType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ElementType::Utf8)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Bool => write!(f, "bool"),
            ElementType::Uint8 => write!(f, "uint8"),
            ElementType::Int32 => write!(f, "int32"),
            ElementType::Int64 => write!(f, "int64"),
            ElementType::Float32 => write!(f, "float32"),
            ElementType::Float64 => write!(f, "float64"),
            ElementType::Utf8 => write!(f, "utf8"),
        }
    }
}

impl FromStr for ElementType {
    type Err = SomaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "bool" | "boolean" => Ok(ElementType::Bool),
            "uint8" | "u8" => Ok(ElementType::Uint8),
            "int32" | "i32" => Ok(ElementType::Int32),
            "int64" | "i64" => Ok(ElementType::Int64),
            "float32" | "f32" => Ok(ElementType::Float32),
            "float64" | "f64" | "double" => Ok(ElementType::Float64),
            "utf8" | "string" | "large_utf8" => Ok(ElementType::Utf8),
            _ => Err(SomaError::InvalidElementType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Collection,
    Experiment,
    Measurement,
    #[serde(rename = "dataframe")]
    #[value(name = "dataframe")]
    DataFrame,
    DenseNdarray,
    SparseNdarray,
}

impl ObjectType {
    pub fn is_container(self) -> bool {
        matches!(
            self,
            ObjectType::Collection | ObjectType::Experiment | ObjectType::Measurement
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Collection => write!(f, "collection"),
            ObjectType::Experiment => write!(f, "experiment"),
            ObjectType::Measurement => write!(f, "measurement"),
            ObjectType::DataFrame => write!(f, "dataframe"),
            ObjectType::DenseNdarray => write!(f, "dense_ndarray"),
            ObjectType::SparseNdarray => write!(f, "sparse_ndarray"),
        }
    }
}

impl FromStr for ObjectType {
    type Err = SomaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "collection" => Ok(ObjectType::Collection),
            "experiment" => Ok(ObjectType::Experiment),
            "measurement" => Ok(ObjectType::Measurement),
            "dataframe" => Ok(ObjectType::DataFrame),
            "dense_ndarray" => Ok(ObjectType::DenseNdarray),
            "sparse_ndarray" => Ok(ObjectType::SparseNdarray),
            _ => Err(SomaError::InvalidObjectType(value.to_string())),
        }
    }
}

/// Which annotation axis a data frame describes. Drives the default index name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    Obs,
    Var,
}

impl Axis {
    pub fn default_index_name(self) -> String {
        format!("{self}_id")
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Obs => write!(f, "obs"),
            Axis::Var => write!(f, "var"),
        }
    }
}

/// A reference to an already-created object, used as the parent of new artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    uri: String,
    object_type: ObjectType,
}

impl ParentRef {
    pub fn new(uri: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            uri: uri.into(),
            object_type,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_element_type_aliases() {
        assert_eq!("f64".parse::<ElementType>().unwrap(), ElementType::Float64);
        assert_eq!("String".parse::<ElementType>().unwrap(), ElementType::Utf8);
        assert!("complex128".parse::<ElementType>().is_err());
    }

    #[test]
    fn container_kinds() {
        assert!(ObjectType::Experiment.is_container());
        assert!(!ObjectType::SparseNdarray.is_container());
        assert_eq!(Axis::Var.default_index_name(), "var_id");
    }
}
