use std::fs;
use std::io::Write;
use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::{ElementType, ObjectType};
use crate::engine::{
    DataFrameHandle, DenseArrayHandle, PlatformConfig, SomaObject, SparseArrayHandle,
    StorageEngine, check_array_type, check_coords_match, check_dense_matches, check_frame_matches,
    check_new_uri, check_sparse_shape,
};
use crate::error::SomaError;
use crate::frame::{DataFrame, Schema};
use crate::matrix::{CoordinateTable, DenseArray};
use crate::uri::is_remote_uri;

pub const ROOT_ENV: &str = "SOMA_INGEST_ROOT";

const MANIFEST_FILE: &str = "soma.json";
const DATA_FILE: &str = "data.json";

/// Storage root used when a relative artifact has no parent container.
///
/// Looked up once per process: `SOMA_INGEST_ROOT` if set, otherwise the
/// platform's local data directory.
pub fn default_storage_root() -> Result<Utf8PathBuf, SomaError> {
    static ROOT: OnceLock<Option<Utf8PathBuf>> = OnceLock::new();
    ROOT.get_or_init(lookup_storage_root)
        .clone()
        .ok_or_else(|| SomaError::Filesystem("unable to resolve default storage root".to_string()))
}

fn lookup_storage_root() -> Option<Utf8PathBuf> {
    if let Ok(root) = std::env::var(ROOT_ENV) {
        if !root.trim().is_empty() {
            return Some(Utf8PathBuf::from(root.trim()));
        }
    }
    BaseDirs::new().and_then(|dirs| {
        Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("soma-ingest")).ok()
    })
}

/// Description of an artifact, stored next to its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub object_type: ObjectType,
    pub created_at: String,
    pub tool: String,
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub index_column_names: Vec<String>,
    #[serde(default)]
    pub element_type: Option<ElementType>,
    #[serde(default)]
    pub shape: Vec<u64>,
    #[serde(default)]
    pub platform_config: PlatformConfig,
}

impl Manifest {
    fn new(object_type: ObjectType, platform_config: &PlatformConfig) -> Self {
        Self {
            object_type,
            created_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("soma-ingest/{}", env!("CARGO_PKG_VERSION")),
            schema: None,
            index_column_names: Vec::new(),
            element_type: None,
            shape: Vec::new(),
            platform_config: platform_config.clone(),
        }
    }
}

/// Storage engine that keeps each artifact in a local directory holding a JSON
/// manifest and a JSON data file. Remote URIs are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemEngine;

impl FilesystemEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn artifact_dir(uri: &str) -> Result<Utf8PathBuf, SomaError> {
        check_new_uri(uri)?;
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Utf8PathBuf::from(path));
        }
        if is_remote_uri(uri) {
            return Err(SomaError::Storage(format!(
                "filesystem engine cannot store remote uri {uri}"
            )));
        }
        Ok(Utf8PathBuf::from(uri))
    }

    pub fn read_manifest(uri: &str) -> Result<Manifest, SomaError> {
        let dir = Self::artifact_dir(uri)?;
        read_json(&dir.join(MANIFEST_FILE))
    }

    pub fn read_dataframe(uri: &str) -> Result<DataFrame, SomaError> {
        Self::read_data(uri, ObjectType::DataFrame)
    }

    pub fn read_dense_array(uri: &str) -> Result<DenseArray, SomaError> {
        Self::read_data(uri, ObjectType::DenseNdarray)
    }

    pub fn read_sparse_fragments(uri: &str) -> Result<Vec<CoordinateTable>, SomaError> {
        let dir = Self::artifact_dir(uri)?;
        let data_path = dir.join(DATA_FILE);
        if !data_path.as_std_path().exists() {
            Self::expect_type(uri, ObjectType::SparseNdarray)?;
            return Ok(Vec::new());
        }
        Self::read_data(uri, ObjectType::SparseNdarray)
    }

    fn read_data<T: DeserializeOwned>(uri: &str, expected: ObjectType) -> Result<T, SomaError> {
        Self::expect_type(uri, expected)?;
        let dir = Self::artifact_dir(uri)?;
        read_json(&dir.join(DATA_FILE))
    }

    fn expect_type(uri: &str, expected: ObjectType) -> Result<(), SomaError> {
        let manifest = Self::read_manifest(uri)?;
        if manifest.object_type != expected {
            return Err(SomaError::Storage(format!(
                "{uri} holds a {}, not a {expected}",
                manifest.object_type
            )));
        }
        Ok(())
    }

    fn create(&self, uri: &str, manifest: &Manifest) -> Result<Utf8PathBuf, SomaError> {
        let dir = Self::artifact_dir(uri)?;
        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.as_std_path().exists() {
            return Err(SomaError::AlreadyExists(uri.to_string()));
        }
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| SomaError::Filesystem(format!("create {dir}: {err}")))?;
        write_json_atomic(&manifest_path, manifest)?;
        tracing::debug!(uri, object_type = %manifest.object_type, "created artifact");
        Ok(dir)
    }
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), SomaError> {
    let parent = path
        .parent()
        .ok_or_else(|| SomaError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SomaError::Filesystem(err.to_string()))?;
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| SomaError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".soma-ingest")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SomaError::Filesystem(err.to_string()))?;
    temp.write_all(&content)
        .map_err(|err| SomaError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| SomaError::Filesystem(err.to_string()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, SomaError> {
    if !path.as_std_path().exists() {
        return Err(SomaError::NotFound(path.to_string()));
    }
    let content =
        fs::read_to_string(path.as_std_path()).map_err(|err| SomaError::Filesystem(err.to_string()))?;
    serde_json::from_str(&content)
        .map_err(|err| SomaError::Filesystem(format!("parse {path}: {err}")))
}

#[derive(Debug, Clone)]
pub struct FsCollection {
    uri: String,
    kind: ObjectType,
}

impl SomaObject for FsCollection {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn object_type(&self) -> ObjectType {
        self.kind
    }
}

#[derive(Debug, Clone)]
pub struct FsDataFrame {
    uri: String,
    dir: Utf8PathBuf,
    schema: Schema,
    index_column_names: Vec<String>,
}

impl SomaObject for FsDataFrame {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::DataFrame
    }
}

impl DataFrameHandle for FsDataFrame {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn index_column_names(&self) -> &[String] {
        &self.index_column_names
    }

    fn write(&mut self, frame: &DataFrame) -> Result<(), SomaError> {
        check_frame_matches(&self.schema, frame)?;
        write_json_atomic(&self.dir.join(DATA_FILE), frame)
    }
}

#[derive(Debug, Clone)]
pub struct FsDenseArray {
    uri: String,
    dir: Utf8PathBuf,
    element_type: ElementType,
    shape: Vec<u64>,
}

impl SomaObject for FsDenseArray {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::DenseNdarray
    }
}

impl DenseArrayHandle for FsDenseArray {
    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn write(&mut self, array: &DenseArray) -> Result<(), SomaError> {
        check_dense_matches(self.element_type, &self.shape, array)?;
        write_json_atomic(&self.dir.join(DATA_FILE), array)
    }
}

#[derive(Debug, Clone)]
pub struct FsSparseArray {
    uri: String,
    dir: Utf8PathBuf,
    element_type: ElementType,
    shape: Vec<u64>,
}

impl SomaObject for FsSparseArray {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::SparseNdarray
    }
}

impl SparseArrayHandle for FsSparseArray {
    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn write(&mut self, coords: &CoordinateTable) -> Result<(), SomaError> {
        check_coords_match(self.element_type, &self.shape, coords)?;
        let data_path = self.dir.join(DATA_FILE);
        let mut fragments: Vec<CoordinateTable> = if data_path.as_std_path().exists() {
            read_json(&data_path)?
        } else {
            Vec::new()
        };
        fragments.push(coords.clone());
        write_json_atomic(&data_path, &fragments)
    }
}

impl StorageEngine for FilesystemEngine {
    type Collection = FsCollection;
    type DataFrame = FsDataFrame;
    type DenseArray = FsDenseArray;
    type SparseArray = FsSparseArray;

    fn create_collection(
        &self,
        uri: &str,
        kind: ObjectType,
        config: &PlatformConfig,
    ) -> Result<Self::Collection, SomaError> {
        if !kind.is_container() {
            return Err(SomaError::Storage(format!("{kind} is not a collection type")));
        }
        self.create(uri, &Manifest::new(kind, config))?;
        Ok(FsCollection {
            uri: uri.to_string(),
            kind,
        })
    }

    fn create_dataframe(
        &self,
        uri: &str,
        schema: &Schema,
        index_column_names: &[String],
        config: &PlatformConfig,
    ) -> Result<Self::DataFrame, SomaError> {
        let mut manifest = Manifest::new(ObjectType::DataFrame, config);
        manifest.schema = Some(schema.clone());
        manifest.index_column_names = index_column_names.to_vec();
        let dir = self.create(uri, &manifest)?;
        Ok(FsDataFrame {
            uri: uri.to_string(),
            dir,
            schema: schema.clone(),
            index_column_names: index_column_names.to_vec(),
        })
    }

    fn create_dense_array(
        &self,
        uri: &str,
        element_type: ElementType,
        shape: &[u64],
        config: &PlatformConfig,
    ) -> Result<Self::DenseArray, SomaError> {
        check_array_type(element_type)?;
        let mut manifest = Manifest::new(ObjectType::DenseNdarray, config);
        manifest.element_type = Some(element_type);
        manifest.shape = shape.to_vec();
        let dir = self.create(uri, &manifest)?;
        Ok(FsDenseArray {
            uri: uri.to_string(),
            dir,
            element_type,
            shape: shape.to_vec(),
        })
    }

    fn create_sparse_array(
        &self,
        uri: &str,
        element_type: ElementType,
        shape: &[u64],
        config: &PlatformConfig,
    ) -> Result<Self::SparseArray, SomaError> {
        check_array_type(element_type)?;
        check_sparse_shape(shape)?;
        let mut manifest = Manifest::new(ObjectType::SparseNdarray, config);
        manifest.element_type = Some(element_type);
        manifest.shape = shape.to_vec();
        let dir = self.create(uri, &manifest)?;
        Ok(FsSparseArray {
            uri: uri.to_string(),
            dir,
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
    fn dense_round_trip_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let uri = temp.path().join("X").to_str().unwrap().to_string();
        let engine = FilesystemEngine::new();
        let mut handle = engine
            .create_dense_array(&uri, ElementType::Int32, &[2, 2], &PlatformConfig::new())
            .unwrap();
        let array = DenseArray::new(vec![2, 2], ArrayData::Int32(vec![1, 2, 3, 4])).unwrap();
        handle.write(&array).unwrap();

        let manifest = FilesystemEngine::read_manifest(&uri).unwrap();
        assert_eq!(manifest.object_type, ObjectType::DenseNdarray);
        assert_eq!(manifest.shape, vec![2, 2]);
        assert_eq!(FilesystemEngine::read_dense_array(&uri).unwrap(), array);
    }

    #[test]
    fn create_refuses_existing_artifact() {
        let temp = tempfile::tempdir().unwrap();
        let uri = temp.path().join("c").to_str().unwrap().to_string();
        let engine = FilesystemEngine::new();
        engine
            .create_collection(&uri, ObjectType::Collection, &PlatformConfig::new())
            .unwrap();
        let err = engine
            .create_collection(&uri, ObjectType::Collection, &PlatformConfig::new())
            .unwrap_err();
        assert_matches!(err, SomaError::AlreadyExists(_));
    }

    #[test]
    fn remote_uris_rejected() {
        let err = FilesystemEngine::artifact_dir("s3://bucket/x").unwrap_err();
        assert_matches!(err, SomaError::Storage(_));
        assert_eq!(
            FilesystemEngine::artifact_dir("file:///tmp/x").unwrap(),
            Utf8PathBuf::from("/tmp/x")
        );
    }
}
