use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{ElementType, ObjectType};
use crate::engine::{
    DataFrameHandle, DenseArrayHandle, PlatformConfig, SomaObject, SparseArrayHandle,
    StorageEngine, check_array_type, check_coords_match, check_dense_matches, check_frame_matches,
    check_new_uri, check_sparse_shape,
};
use crate::error::SomaError;
use crate::frame::{DataFrame, Schema};
use crate::matrix::{CoordinateTable, DenseArray};

/// What the in-memory engine holds at one location.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredObject {
    Collection {
        kind: ObjectType,
    },
    DataFrame {
        schema: Schema,
        index_column_names: Vec<String>,
        data: Option<DataFrame>,
    },
    DenseArray {
        element_type: ElementType,
        shape: Vec<u64>,
        data: Option<DenseArray>,
    },
    SparseArray {
        element_type: ElementType,
        shape: Vec<u64>,
        fragments: Vec<CoordinateTable>,
    },
}

/// Storage engine that keeps every artifact in a shared map. Cloning shares state.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Result<Option<StoredObject>, SomaError> {
        Ok(self.lock()?.get(uri).cloned())
    }

    pub fn uris(&self) -> Result<Vec<String>, SomaError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredObject>>, SomaError> {
        self.objects
            .lock()
            .map_err(|_| SomaError::Storage("memory engine state poisoned".to_string()))
    }

    fn insert_new(&self, uri: &str, object: StoredObject) -> Result<(), SomaError> {
        check_new_uri(uri)?;
        let mut objects = self.lock()?;
        if objects.contains_key(uri) {
            return Err(SomaError::AlreadyExists(uri.to_string()));
        }
        objects.insert(uri.to_string(), object);
        Ok(())
    }

    fn update(
        &self,
        uri: &str,
        apply: impl FnOnce(&mut StoredObject) -> Result<(), SomaError>,
    ) -> Result<(), SomaError> {
        let mut objects = self.lock()?;
        let object = objects
            .get_mut(uri)
            .ok_or_else(|| SomaError::NotFound(uri.to_string()))?;
        apply(object)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryCollection {
    uri: String,
    kind: ObjectType,
}

impl SomaObject for MemoryCollection {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn object_type(&self) -> ObjectType {
        self.kind
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDataFrame {
    engine: MemoryEngine,
    uri: String,
    schema: Schema,
    index_column_names: Vec<String>,
}

impl SomaObject for MemoryDataFrame {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::DataFrame
    }
}

impl DataFrameHandle for MemoryDataFrame {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn index_column_names(&self) -> &[String] {
        &self.index_column_names
    }

    fn write(&mut self, frame: &DataFrame) -> Result<(), SomaError> {
        check_frame_matches(&self.schema, frame)?;
        self.engine.update(&self.uri, |object| match object {
            StoredObject::DataFrame { data, .. } => {
                *data = Some(frame.clone());
                Ok(())
            }
            _ => Err(SomaError::Storage(format!("{} is not a dataframe", self.uri))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDenseArray {
    engine: MemoryEngine,
    uri: String,
    element_type: ElementType,
    shape: Vec<u64>,
}

impl SomaObject for MemoryDenseArray {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::DenseNdarray
    }
}

impl DenseArrayHandle for MemoryDenseArray {
    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn write(&mut self, array: &DenseArray) -> Result<(), SomaError> {
        check_dense_matches(self.element_type, &self.shape, array)?;
        self.engine.update(&self.uri, |object| match object {
            StoredObject::DenseArray { data, .. } => {
                *data = Some(array.clone());
                Ok(())
            }
            _ => Err(SomaError::Storage(format!("{} is not a dense array", self.uri))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemorySparseArray {
    engine: MemoryEngine,
    uri: String,
    element_type: ElementType,
    shape: Vec<u64>,
}

impl SomaObject for MemorySparseArray {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::SparseNdarray
    }
}

impl SparseArrayHandle for MemorySparseArray {
    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn write(&mut self, coords: &CoordinateTable) -> Result<(), SomaError> {
        check_coords_match(self.element_type, &self.shape, coords)?;
        self.engine.update(&self.uri, |object| match object {
            StoredObject::SparseArray { fragments, .. } => {
                fragments.push(coords.clone());
                Ok(())
            }
            _ => Err(SomaError::Storage(format!("{} is not a sparse array", self.uri))),
        })
    }
}

impl StorageEngine for MemoryEngine {
    type Collection = MemoryCollection;
    type DataFrame = MemoryDataFrame;
    type DenseArray = MemoryDenseArray;
    type SparseArray = MemorySparseArray;

    fn create_collection(
        &self,
        uri: &str,
        kind: ObjectType,
        _config: &PlatformConfig,
    ) -> Result<Self::Collection, SomaError> {
        if !kind.is_container() {
            return Err(SomaError::Storage(format!("{kind} is not a collection type")));
        }
        self.insert_new(uri, StoredObject::Collection { kind })?;
        Ok(MemoryCollection {
            uri: uri.to_string(),
            kind,
        })
    }

    fn create_dataframe(
        &self,
        uri: &str,
        schema: &Schema,
        index_column_names: &[String],
        _config: &PlatformConfig,
    ) -> Result<Self::DataFrame, SomaError> {
        self.insert_new(
            uri,
            StoredObject::DataFrame {
                schema: schema.clone(),
                index_column_names: index_column_names.to_vec(),
                data: None,
            },
        )?;
        Ok(MemoryDataFrame {
            engine: self.clone(),
            uri: uri.to_string(),
            schema: schema.clone(),
            index_column_names: index_column_names.to_vec(),
        })
    }

    fn create_dense_array(
        &self,
        uri: &str,
        element_type: ElementType,
        shape: &[u64],
        _config: &PlatformConfig,
    ) -> Result<Self::DenseArray, SomaError> {
        check_array_type(element_type)?;
        self.insert_new(
            uri,
            StoredObject::DenseArray {
                element_type,
                shape: shape.to_vec(),
                data: None,
            },
        )?;
        Ok(MemoryDenseArray {
            engine: self.clone(),
            uri: uri.to_string(),
            element_type,
            shape: shape.to_vec(),
        })
    }

    fn create_sparse_array(
        &self,
        uri: &str,
        element_type: ElementType,
        shape: &[u64],
        _config: &PlatformConfig,
    ) -> Result<Self::SparseArray, SomaError> {
        check_array_type(element_type)?;
        check_sparse_shape(shape)?;
        self.insert_new(
            uri,
            StoredObject::SparseArray {
                element_type,
                shape: shape.to_vec(),
                fragments: Vec::new(),
            },
        )?;
        Ok(MemorySparseArray {
            engine: self.clone(),
            uri: uri.to_string(),
            element_type,
            shape: shape.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::matrix::ArrayData;

    #[test]
    fn create_twice_fails() {
        let engine = MemoryEngine::new();
        let config = PlatformConfig::new();
        engine
            .create_dense_array("a", ElementType::Float64, &[2], &config)
            .unwrap();
        let err = engine
            .create_dense_array("a", ElementType::Float64, &[2], &config)
            .unwrap_err();
        assert_matches!(err, SomaError::AlreadyExists(_));
    }

    #[test]
    fn dense_write_checks_shape() {
        let engine = MemoryEngine::new();
        let mut handle = engine
            .create_dense_array("a", ElementType::Float64, &[3], &PlatformConfig::new())
            .unwrap();
        let array = DenseArray::new(vec![2], ArrayData::Float64(vec![1.0, 2.0])).unwrap();
        assert_matches!(handle.write(&array), Err(SomaError::Storage(_)));
    }

    #[test]
    fn sparse_write_appends_fragment() {
        let engine = MemoryEngine::new();
        let mut handle = engine
            .create_sparse_array("s", ElementType::Int32, &[2, 2], &PlatformConfig::new())
            .unwrap();
        let coords = CoordinateTable {
            soma_dim_0: vec![0, 1],
            soma_dim_1: vec![1, 0],
            soma_data: ArrayData::Int32(vec![7, 8]),
        };
        handle.write(&coords).unwrap();
        assert_matches!(
            engine.get("s"),
            Ok(Some(StoredObject::SparseArray { fragments, .. })) if fragments == vec![coords]
        );
    }

    #[test]
    fn poisoned_state_is_an_error() {
        let engine = MemoryEngine::new();
        let shared = engine.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.objects.lock().unwrap();
            panic!("writer died");
        })
        .join();
        assert_matches!(engine.get("s"), Err(SomaError::Storage(_)));
        assert_matches!(engine.uris(), Err(SomaError::Storage(_)));
    }
}
