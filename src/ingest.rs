use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ResolvedConfig, default_alt_name, default_index_prefix};
use crate::domain::{Axis, ElementType, ObjectType, ParentRef};
use crate::engine::{
    DataFrameHandle, DenseArrayHandle, PlatformConfig, SomaObject, SparseArrayHandle,
    StorageEngine,
};
use crate::error::SomaError;
use crate::frame::{Column, ColumnValues, DataFrame, Field, SOMA_JOINID, Schema};
use crate::matrix::{CooMatrix, DenseArray, MatrixInput, MatrixStructure};
use crate::uri::{ResolvedUri, UriMode, resolve_uri};

const RANDOM_NAME_LEN: usize = 10;

/// Where a new artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub uri: String,
    pub parent: Option<ParentRef>,
    pub mode: UriMode,
}

impl Target {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            parent: None,
            mode: UriMode::Relative,
        }
    }

    pub fn under(mut self, parent: ParentRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn absolute(mut self) -> Self {
        self.mode = UriMode::Absolute;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOptions {
    /// Column that identifies rows. Falls back to the frame's own annotation,
    /// then to a synthesized column of row labels.
    pub index_column: Option<String>,
    /// Columns the engine indexes the table by.
    pub index_column_names: Vec<String>,
    pub axis: Axis,
    pub alt_name: String,
    pub prefix: String,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            index_column: None,
            index_column_names: vec![SOMA_JOINID.to_string()],
            axis: Axis::Obs,
            alt_name: default_alt_name(),
            prefix: default_index_prefix(),
        }
    }
}

impl FrameOptions {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            alt_name: config.alt_name.clone(),
            prefix: config.index_prefix.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayOptions {
    /// `None` keeps the input's own encoding.
    pub sparse: Option<bool>,
    pub element_type: Option<ElementType>,
    pub transpose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteOptions {
    pub frame: FrameOptions,
    pub array: ArrayOptions,
}

/// Input accepted by [`Ingestor::write`], one variant per shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SomaInput {
    Tabular(DataFrame),
    DenseNumeric(DenseArray),
    SparseCoordinate(CooMatrix),
}

/// A table after normalization, ready for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFrame {
    pub frame: DataFrame,
    pub schema: Schema,
    pub index_column: String,
}

/// Opened artifact returned by the shape-dispatching entry points.
pub enum Artifact<E: StorageEngine> {
    DataFrame(E::DataFrame),
    DenseArray(E::DenseArray),
    SparseArray(E::SparseArray),
}

impl<E: StorageEngine> fmt::Debug for Artifact<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::DataFrame(handle) => f.debug_tuple("DataFrame").field(handle).finish(),
            Artifact::DenseArray(handle) => f.debug_tuple("DenseArray").field(handle).finish(),
            Artifact::SparseArray(handle) => f.debug_tuple("SparseArray").field(handle).finish(),
        }
    }
}

impl<E: StorageEngine> SomaObject for Artifact<E> {
    fn uri(&self) -> &str {
        match self {
            Artifact::DataFrame(handle) => handle.uri(),
            Artifact::DenseArray(handle) => handle.uri(),
            Artifact::SparseArray(handle) => handle.uri(),
        }
    }

    fn object_type(&self) -> ObjectType {
        match self {
            Artifact::DataFrame(handle) => handle.object_type(),
            Artifact::DenseArray(handle) => handle.object_type(),
            Artifact::SparseArray(handle) => handle.object_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteSummary {
    pub uri: String,
    pub object_type: ObjectType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<ElementType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub index_column_names: Vec<String>,
}

impl<E: StorageEngine> Artifact<E> {
    pub fn summary(&self) -> WriteSummary {
        let mut summary = WriteSummary {
            uri: self.uri().to_string(),
            object_type: self.object_type(),
            element_type: None,
            shape: Vec::new(),
            columns: Vec::new(),
            index_column_names: Vec::new(),
        };
        match self {
            Artifact::DataFrame(handle) => {
                summary.columns = handle
                    .schema()
                    .names()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                summary.index_column_names = handle.index_column_names().to_vec();
            }
            Artifact::DenseArray(handle) => {
                summary.element_type = Some(handle.element_type());
                summary.shape = handle.shape().to_vec();
            }
            Artifact::SparseArray(handle) => {
                summary.element_type = Some(handle.element_type());
                summary.shape = handle.shape().to_vec();
            }
        }
        summary
    }
}

impl ParentRef {
    pub fn of<O: SomaObject + ?Sized>(object: &O) -> Self {
        ParentRef::new(object.uri(), object.object_type())
    }
}

/// Normalizes in-memory inputs and hands them to a storage engine.
#[derive(Clone)]
pub struct Ingestor<E: StorageEngine> {
    engine: E,
    storage_root: Utf8PathBuf,
    platform_config: PlatformConfig,
}

impl<E: StorageEngine> Ingestor<E> {
    pub fn new(engine: E, storage_root: Utf8PathBuf) -> Self {
        Self {
            engine,
            storage_root,
            platform_config: PlatformConfig::default(),
        }
    }

    pub fn from_config(engine: E, config: &ResolvedConfig) -> Self {
        Self::new(engine, config.storage_root.clone())
            .with_platform_config(config.platform_config.clone())
    }

    pub fn with_platform_config(mut self, platform_config: PlatformConfig) -> Self {
        self.platform_config = platform_config;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn storage_root(&self) -> &Utf8Path {
        &self.storage_root
    }

    pub fn resolve(&self, target: &Target) -> Result<ResolvedUri, SomaError> {
        resolve_uri(
            &target.uri,
            target.parent.as_ref(),
            target.mode,
            &self.storage_root,
        )
    }

    pub fn create_collection(
        &self,
        target: &Target,
        kind: ObjectType,
    ) -> Result<E::Collection, SomaError> {
        if !kind.is_container() {
            return Err(SomaError::Configuration(format!(
                "{kind} is not a collection type"
            )));
        }
        let uri = self.resolve(target)?.uri;
        self.engine
            .create_collection(&uri, kind, &self.platform_config)
    }

    /// Write any supported input, choosing the writer by its shape.
    pub fn write(
        &self,
        input: &SomaInput,
        target: &Target,
        options: &WriteOptions,
    ) -> Result<Artifact<E>, SomaError> {
        match input {
            SomaInput::Tabular(frame) => Ok(Artifact::DataFrame(self.write_dataframe(
                frame,
                target,
                &options.frame,
            )?)),
            SomaInput::DenseNumeric(array) => {
                self.write_matrix(&MatrixInput::Dense(array.clone()), target, &options.array)
            }
            SomaInput::SparseCoordinate(matrix) => {
                self.write_matrix(&MatrixInput::Sparse(matrix.clone()), target, &options.array)
            }
        }
    }

    pub fn write_dataframe(
        &self,
        frame: &DataFrame,
        target: &Target,
        options: &FrameOptions,
    ) -> Result<E::DataFrame, SomaError> {
        let uri = self.resolve(target)?.uri;
        let normalized = normalize_dataframe(frame, options)?;

        tracing::debug!(
            uri = uri.as_str(),
            index = normalized.index_column.as_str(),
            columns = normalized.schema.fields.len(),
            "creating dataframe"
        );
        let mut handle = self.engine.create_dataframe(
            &uri,
            &normalized.schema,
            &options.index_column_names,
            &self.platform_config,
        )?;
        handle.write(&normalized.frame)?;
        tracing::info!(uri = uri.as_str(), rows = normalized.frame.n_rows(), "wrote dataframe");
        Ok(handle)
    }

    /// Write a matrix as a dense array, or through the sparse path when it is
    /// sparse-encoded or `options.sparse` asks for it.
    pub fn write_matrix(
        &self,
        input: &MatrixInput,
        target: &Target,
        options: &ArrayOptions,
    ) -> Result<Artifact<E>, SomaError> {
        match (input, options.sparse) {
            (MatrixInput::Sparse(_), Some(false)) => Err(SomaError::IncompatibleRequest(
                "input is sparse-encoded but a dense array was requested".to_string(),
            )),
            (MatrixInput::Sparse(matrix), _) => Ok(Artifact::SparseArray(
                self.write_sparse(matrix, target, options)?,
            )),
            (MatrixInput::Dense(array), Some(true)) => {
                if array.ndim() != 2 {
                    return Err(SomaError::IncompatibleRequest(format!(
                        "only two-dimensional arrays can be written sparse, got {} dimensions",
                        array.ndim()
                    )));
                }
                let matrix = CooMatrix::from_dense(array)?;
                Ok(Artifact::SparseArray(
                    self.write_sparse(&matrix, target, options)?,
                ))
            }
            (MatrixInput::Dense(array), _) => Ok(Artifact::DenseArray(
                self.write_dense(array, target, options)?,
            )),
        }
    }

    pub fn write_dense(
        &self,
        array: &DenseArray,
        target: &Target,
        options: &ArrayOptions,
    ) -> Result<E::DenseArray, SomaError> {
        let uri = self.resolve(target)?.uri;
        let array = if options.transpose {
            array.transposed()?
        } else {
            array.clone()
        };
        let array = match options.element_type {
            Some(element_type) => array.cast(element_type)?,
            None => array,
        };

        tracing::debug!(uri = uri.as_str(), shape = ?array.shape(), "creating dense array");
        let mut handle = self.engine.create_dense_array(
            &uri,
            array.element_type(),
            array.shape(),
            &self.platform_config,
        )?;
        handle.write(&array)?;
        tracing::info!(uri = uri.as_str(), "wrote dense array");
        Ok(handle)
    }

    pub fn write_sparse(
        &self,
        matrix: &CooMatrix,
        target: &Target,
        options: &ArrayOptions,
    ) -> Result<E::SparseArray, SomaError> {
        if matrix.structure() != MatrixStructure::General {
            return Err(SomaError::TypeMismatch(format!(
                "sparse input must be a general matrix, got {:?}",
                matrix.structure()
            )));
        }
        if matrix.is_pattern() {
            return Err(SomaError::TypeMismatch(
                "sparse input must carry values, got a pattern matrix".to_string(),
            ));
        }

        let uri = self.resolve(target)?.uri;
        let matrix = if options.transpose {
            matrix.transposed()
        } else {
            matrix.clone()
        };
        let matrix = match options.element_type {
            Some(element_type) => matrix.cast(element_type)?,
            None => matrix,
        };
        let coords = matrix.to_coordinate_table()?;

        tracing::debug!(
            uri = uri.as_str(),
            shape = ?matrix.shape(),
            nnz = coords.len(),
            "creating sparse array"
        );
        let mut handle = self.engine.create_sparse_array(
            &uri,
            coords.soma_data.element_type(),
            &matrix.shape(),
            &self.platform_config,
        )?;
        handle.write(&coords)?;
        tracing::info!(uri = uri.as_str(), nnz = coords.len(), "wrote sparse array");
        Ok(handle)
    }
}

/// Prepare a copy of `frame` for storage.
///
/// Categorical columns become text, an index column is chosen (or made from
/// the row labels), and `soma_joinid` is added when missing. Every column the
/// engine cannot represent is reported in one error.
pub fn normalize_dataframe(
    frame: &DataFrame,
    options: &FrameOptions,
) -> Result<NormalizedFrame, SomaError> {
    let mut working = frame.clone();

    for column in working.columns_mut() {
        if column.values.is_categorical() {
            let values = std::mem::replace(&mut column.values, ColumnValues::Text(Vec::new()));
            column.values = values.decode_categories()?;
        }
    }
    let mut schema = Schema::infer(&working)?;

    let explicit = options
        .index_column
        .clone()
        .or_else(|| working.index().map(str::to_string));
    let index_column = match explicit {
        Some(name) => name,
        None => {
            let name = pick_index_name(&working, options);
            let labels = working.row_names();
            add_column(
                &mut working,
                &mut schema,
                Column::new(name.clone(), ColumnValues::Text(labels)),
            )?;
            name
        }
    };
    if !working.has_column(&index_column) {
        return Err(SomaError::MissingIndex(index_column));
    }
    working.set_index(index_column.clone());

    if !working.has_column(SOMA_JOINID) {
        let joinids = (0..working.n_rows() as i64).collect();
        add_column(
            &mut working,
            &mut schema,
            Column::new(SOMA_JOINID, ColumnValues::Int64(joinids)),
        )?;
    }

    let missing = options
        .index_column_names
        .iter()
        .filter(|name| !working.has_column(name))
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(SomaError::MissingIndexColumns(missing));
    }

    Ok(NormalizedFrame {
        frame: working,
        schema,
        index_column,
    })
}

fn add_column(
    frame: &mut DataFrame,
    schema: &mut Schema,
    column: Column,
) -> Result<(), SomaError> {
    let element_type = column.values.element_type().ok_or_else(|| {
        SomaError::UnsupportedColumns(vec![column.name.clone()])
    })?;
    let field = Field {
        name: column.name.clone(),
        element_type,
    };
    frame.push_column(column)?;
    schema.fields.push(field);
    Ok(())
}

/// Deterministic index names, in the order they are tried.
pub fn index_name_candidates(axis: Axis, alt_name: &str, prefix: &str) -> Vec<String> {
    let default = axis.default_index_name();
    vec![
        default.clone(),
        alt_name.to_string(),
        format!("{prefix}_{default}"),
        format!("{prefix}_{alt_name}"),
    ]
}

fn pick_index_name(frame: &DataFrame, options: &FrameOptions) -> String {
    index_name_candidates(options.axis, &options.alt_name, &options.prefix)
        .into_iter()
        .find(|name| !name.is_empty() && !frame.has_column(name))
        .unwrap_or_else(|| random_unused_name(frame))
}

fn random_unused_name(frame: &DataFrame) -> String {
    let mut rng = rand::rng();
    loop {
        let name = (0..RANDOM_NAME_LEN)
            .map(|_| char::from(rng.random_range(b'a'..=b'z')))
            .collect::<String>();
        if !frame.has_column(&name) {
            return name;
        }
    }
}
