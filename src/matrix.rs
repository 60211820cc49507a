//! Dense and coordinate-format (COO) numeric buffers.
//!
//! [`DenseArray`] is a row-major buffer with an N-dimensional shape. [`CooMatrix`]
//! stores a two-dimensional sparse matrix as parallel `(row, col, value)` vectors,
//! which is the shape single-cell count matrices usually arrive in. Neither type
//! resolves duplicate coordinates; triples pass through as given.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::domain::ElementType;
use crate::error::SomaError;

/// A typed, flat value buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum ArrayData {
    Bool(Vec<bool>),
    Uint8(Vec<u8>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(#[serde(with = "crate::float_json")] Vec<f32>),
    Float64(#[serde(with = "crate::float_json")] Vec<f64>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::Uint8(v) => v.len(),
            ArrayData::Int32(v) => v.len(),
            ArrayData::Int64(v) => v.len(),
            ArrayData::Float32(v) => v.len(),
            ArrayData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ArrayData::Bool(_) => ElementType::Bool,
            ArrayData::Uint8(_) => ElementType::Uint8,
            ArrayData::Int32(_) => ElementType::Int32,
            ArrayData::Int64(_) => ElementType::Int64,
            ArrayData::Float32(_) => ElementType::Float32,
            ArrayData::Float64(_) => ElementType::Float64,
        }
    }

    /// Gather the elements at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> ArrayData {
        fn pick<T: Copy>(values: &[T], positions: &[usize]) -> Vec<T> {
            positions.iter().map(|&i| values[i]).collect()
        }
        match self {
            ArrayData::Bool(v) => ArrayData::Bool(pick(v, positions)),
            ArrayData::Uint8(v) => ArrayData::Uint8(pick(v, positions)),
            ArrayData::Int32(v) => ArrayData::Int32(pick(v, positions)),
            ArrayData::Int64(v) => ArrayData::Int64(pick(v, positions)),
            ArrayData::Float32(v) => ArrayData::Float32(pick(v, positions)),
            ArrayData::Float64(v) => ArrayData::Float64(pick(v, positions)),
        }
    }

    /// Treat the buffer as a row-major array of `shape` and return its
    /// elements with the axis order reversed, again row-major.
    pub fn reversed_axes(&self, shape: &[usize]) -> Result<ArrayData, SomaError> {
        fn reverse<T: Clone>(values: &[T], shape: &[usize]) -> Result<Vec<T>, SomaError> {
            let array = ArrayD::from_shape_vec(IxDyn(shape), values.to_vec())
                .map_err(|err| SomaError::InvalidInput(format!("shape {shape:?}: {err}")))?;
            Ok(array.reversed_axes().iter().cloned().collect())
        }
        Ok(match self {
            ArrayData::Bool(v) => ArrayData::Bool(reverse(v, shape)?),
            ArrayData::Uint8(v) => ArrayData::Uint8(reverse(v, shape)?),
            ArrayData::Int32(v) => ArrayData::Int32(reverse(v, shape)?),
            ArrayData::Int64(v) => ArrayData::Int64(reverse(v, shape)?),
            ArrayData::Float32(v) => ArrayData::Float32(reverse(v, shape)?),
            ArrayData::Float64(v) => ArrayData::Float64(reverse(v, shape)?),
        })
    }

    /// Flat positions of every element that is not zero (or `false`).
    pub fn nonzero_positions(&self) -> Vec<usize> {
        fn scan<T: Copy>(values: &[T], is_zero: impl Fn(T) -> bool) -> Vec<usize> {
            values
                .iter()
                .enumerate()
                .filter(|(_, value)| !is_zero(**value))
                .map(|(i, _)| i)
                .collect()
        }
        match self {
            ArrayData::Bool(v) => scan(v, |x| !x),
            ArrayData::Uint8(v) => scan(v, |x| x == 0),
            ArrayData::Int32(v) => scan(v, |x| x == 0),
            ArrayData::Int64(v) => scan(v, |x| x == 0),
            ArrayData::Float32(v) => scan(v, |x| x == 0.0),
            ArrayData::Float64(v) => scan(v, |x| x == 0.0),
        }
    }

    /// Convert the buffer to `target`.
    ///
    /// Float to integer conversions truncate toward zero; values that are not
    /// finite or do not fit the target are rejected rather than wrapped.
    pub fn cast(&self, target: ElementType) -> Result<ArrayData, SomaError> {
        if target == self.element_type() {
            return Ok(self.clone());
        }
        match target {
            ElementType::Bool => Ok(ArrayData::Bool(
                self.to_f64_values().into_iter().map(|x| x != 0.0).collect(),
            )),
            ElementType::Uint8 => Ok(ArrayData::Uint8(narrow(self.to_i64_values()?, target)?)),
            ElementType::Int32 => Ok(ArrayData::Int32(narrow(self.to_i64_values()?, target)?)),
            ElementType::Int64 => Ok(ArrayData::Int64(self.to_i64_values()?)),
            ElementType::Float32 => Ok(ArrayData::Float32(
                self.to_f64_values()
                    .into_iter()
                    .map(f64_to_f32)
                    .collect::<Result<_, _>>()?,
            )),
            ElementType::Float64 => Ok(ArrayData::Float64(self.to_f64_values())),
            ElementType::Utf8 => Err(SomaError::TypeMismatch(format!(
                "cannot store {} array values as {target}",
                self.element_type()
            ))),
        }
    }

    fn to_f64_values(&self) -> Vec<f64> {
        match self {
            ArrayData::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            ArrayData::Uint8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::Int32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::Int64(v) => v.iter().map(|&x| x as f64).collect(),
            ArrayData::Float32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            ArrayData::Float64(v) => v.clone(),
        }
    }

    fn to_i64_values(&self) -> Result<Vec<i64>, SomaError> {
        match self {
            ArrayData::Bool(v) => Ok(v.iter().map(|&b| i64::from(b)).collect()),
            ArrayData::Uint8(v) => Ok(v.iter().map(|&x| i64::from(x)).collect()),
            ArrayData::Int32(v) => Ok(v.iter().map(|&x| i64::from(x)).collect()),
            ArrayData::Int64(v) => Ok(v.clone()),
            ArrayData::Float32(v) => v.iter().map(|&x| float_to_i64(f64::from(x))).collect(),
            ArrayData::Float64(v) => v.iter().map(|&x| float_to_i64(x)).collect(),
        }
    }
}

fn f64_to_f32(value: f64) -> Result<f32, SomaError> {
    let narrowed = value as f32;
    if value.is_finite() && !narrowed.is_finite() {
        return Err(SomaError::TypeMismatch(format!(
            "value {value} is out of range for float32"
        )));
    }
    Ok(narrowed)
}

fn float_to_i64(value: f64) -> Result<i64, SomaError> {
    if !value.is_finite() || value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(SomaError::TypeMismatch(format!(
            "value {value} cannot be stored as an integer"
        )));
    }
    Ok(value.trunc() as i64)
}

fn narrow<T: TryFrom<i64>>(values: Vec<i64>, target: ElementType) -> Result<Vec<T>, SomaError> {
    values
        .into_iter()
        .map(|x| {
            T::try_from(x).map_err(|_| {
                SomaError::TypeMismatch(format!("value {x} is out of range for {target}"))
            })
        })
        .collect()
}

/// A row-major N-dimensional buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DenseArrayRepr")]
pub struct DenseArray {
    shape: Vec<u64>,
    data: ArrayData,
}

#[derive(Deserialize)]
struct DenseArrayRepr {
    shape: Vec<u64>,
    data: ArrayData,
}

impl TryFrom<DenseArrayRepr> for DenseArray {
    type Error = SomaError;

    fn try_from(repr: DenseArrayRepr) -> Result<Self, Self::Error> {
        DenseArray::new(repr.shape, repr.data)
    }
}

impl DenseArray {
    pub fn new(shape: Vec<u64>, data: ArrayData) -> Result<Self, SomaError> {
        if shape.is_empty() {
            return Err(SomaError::InvalidInput(
                "dense arrays need at least one dimension".to_string(),
            ));
        }
        let expected = shape
            .iter()
            .try_fold(1u64, |acc, &extent| acc.checked_mul(extent))
            .ok_or_else(|| SomaError::InvalidInput(format!("shape {shape:?} overflows")))?;
        if expected != data.len() as u64 {
            return Err(SomaError::InvalidInput(format!(
                "shape {shape:?} needs {expected} values, buffer has {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Build a two-dimensional array from row vectors.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, SomaError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |row| row.len());
        if rows.iter().any(|row| row.len() != n_cols) {
            return Err(SomaError::InvalidInput("rows have unequal lengths".to_string()));
        }
        let data = rows.iter().flatten().copied().collect();
        Self::new(vec![n_rows as u64, n_cols as u64], ArrayData::Float64(data))
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn cast(&self, target: ElementType) -> Result<Self, SomaError> {
        Ok(Self {
            shape: self.shape.clone(),
            data: self.data.cast(target)?,
        })
    }

    /// Reverse the axis order. For a matrix this is the ordinary transpose.
    pub fn transposed(&self) -> Result<Self, SomaError> {
        if self.ndim() < 2 {
            return Ok(self.clone());
        }
        let shape = self
            .shape
            .iter()
            .map(|&extent| {
                usize::try_from(extent)
                    .map_err(|_| SomaError::InvalidInput(format!("extent {extent} too large")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            shape: self.shape.iter().rev().copied().collect(),
            data: self.data.reversed_axes(&shape)?,
        })
    }
}

/// Storage structure of a sparse matrix. Only general matrices carry every
/// stored entry explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixStructure {
    #[default]
    General,
    Symmetric,
    Triangular,
}

/// A two-dimensional sparse matrix in COO format.
///
/// `values` is `None` for pattern matrices, which record only where entries are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CooMatrixRepr")]
pub struct CooMatrix {
    shape: [u64; 2],
    rows: Vec<u64>,
    cols: Vec<u64>,
    values: Option<ArrayData>,
    structure: MatrixStructure,
}

#[derive(Deserialize)]
struct CooMatrixRepr {
    shape: [u64; 2],
    rows: Vec<u64>,
    cols: Vec<u64>,
    #[serde(default)]
    values: Option<ArrayData>,
    #[serde(default)]
    structure: MatrixStructure,
}

impl TryFrom<CooMatrixRepr> for CooMatrix {
    type Error = SomaError;

    fn try_from(repr: CooMatrixRepr) -> Result<Self, Self::Error> {
        let matrix = CooMatrix::build(repr.shape, repr.rows, repr.cols, repr.values)?;
        Ok(matrix.with_structure(repr.structure))
    }
}

impl CooMatrix {
    /// Create a general matrix from triplet vectors. All three must have the
    /// same length and every coordinate must lie inside `shape`.
    pub fn new(
        shape: [u64; 2],
        rows: Vec<u64>,
        cols: Vec<u64>,
        values: ArrayData,
    ) -> Result<Self, SomaError> {
        Self::build(shape, rows, cols, Some(values))
    }

    /// Create a pattern matrix, which stores coordinates but no values.
    pub fn pattern(shape: [u64; 2], rows: Vec<u64>, cols: Vec<u64>) -> Result<Self, SomaError> {
        Self::build(shape, rows, cols, None)
    }

    fn build(
        shape: [u64; 2],
        rows: Vec<u64>,
        cols: Vec<u64>,
        values: Option<ArrayData>,
    ) -> Result<Self, SomaError> {
        let values_len = values.as_ref().map_or(rows.len(), ArrayData::len);
        if rows.len() != cols.len() || cols.len() != values_len {
            return Err(SomaError::InvalidInput(
                "rows, cols, and values must have the same length".to_string(),
            ));
        }
        for (i, (&r, &c)) in rows.iter().zip(cols.iter()).enumerate() {
            if r >= shape[0] || c >= shape[1] {
                return Err(SomaError::InvalidInput(format!(
                    "triplet {i} index ({r}, {c}) out of bounds for ({}, {})",
                    shape[0], shape[1]
                )));
            }
        }
        Ok(Self {
            shape,
            rows,
            cols,
            values,
            structure: MatrixStructure::General,
        })
    }

    pub fn with_structure(mut self, structure: MatrixStructure) -> Self {
        self.structure = structure;
        self
    }

    /// Collect the non-zero entries of a two-dimensional dense array in
    /// row-major order.
    pub fn from_dense(array: &DenseArray) -> Result<Self, SomaError> {
        let [n_rows, n_cols] = <[u64; 2]>::try_from(array.shape()).map_err(|_| {
            SomaError::InvalidInput(format!(
                "only two-dimensional arrays convert to COO, got {} dimensions",
                array.ndim()
            ))
        })?;
        let positions = array.data().nonzero_positions();
        let mut rows = Vec::with_capacity(positions.len());
        let mut cols = Vec::with_capacity(positions.len());
        for &flat in &positions {
            rows.push(flat as u64 / n_cols);
            cols.push(flat as u64 % n_cols);
        }
        Self::new(
            [n_rows, n_cols],
            rows,
            cols,
            array.data().select(&positions),
        )
    }

    pub fn shape(&self) -> [u64; 2] {
        self.shape
    }

    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[u64] {
        &self.rows
    }

    pub fn cols(&self) -> &[u64] {
        &self.cols
    }

    pub fn values(&self) -> Option<&ArrayData> {
        self.values.as_ref()
    }

    pub fn structure(&self) -> MatrixStructure {
        self.structure
    }

    pub fn is_pattern(&self) -> bool {
        self.values.is_none()
    }

    /// Swap the row and column roles of every triple.
    pub fn transposed(&self) -> Self {
        Self {
            shape: [self.shape[1], self.shape[0]],
            rows: self.cols.clone(),
            cols: self.rows.clone(),
            values: self.values.clone(),
            structure: self.structure,
        }
    }

    pub fn cast(&self, target: ElementType) -> Result<Self, SomaError> {
        let values = match &self.values {
            Some(values) => Some(values.cast(target)?),
            None => None,
        };
        Ok(Self {
            values,
            ..self.clone()
        })
    }

    /// Label the triples with storage dimension names.
    pub fn to_coordinate_table(&self) -> Result<CoordinateTable, SomaError> {
        let values = self.values.clone().ok_or_else(|| {
            SomaError::TypeMismatch("pattern matrices have no values to write".to_string())
        })?;
        Ok(CoordinateTable {
            soma_dim_0: to_signed(&self.rows)?,
            soma_dim_1: to_signed(&self.cols)?,
            soma_data: values,
        })
    }
}

fn to_signed(coords: &[u64]) -> Result<Vec<i64>, SomaError> {
    coords
        .iter()
        .map(|&c| {
            i64::try_from(c)
                .map_err(|_| SomaError::InvalidInput(format!("coordinate {c} exceeds int64")))
        })
        .collect()
}

/// Sparse write payload: dimension-0 and dimension-1 coordinates plus data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTable {
    pub soma_dim_0: Vec<i64>,
    pub soma_dim_1: Vec<i64>,
    pub soma_data: ArrayData,
}

impl CoordinateTable {
    pub fn len(&self) -> usize {
        self.soma_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soma_data.is_empty()
    }
}

/// Matrix input to the dense writer, which may already be sparse-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "lowercase")]
pub enum MatrixInput {
    Dense(DenseArray),
    Sparse(CooMatrix),
}

impl From<DenseArray> for MatrixInput {
    fn from(array: DenseArray) -> Self {
        MatrixInput::Dense(array)
    }
}

impl From<CooMatrix> for MatrixInput {
    fn from(matrix: CooMatrix) -> Self {
        MatrixInput::Sparse(matrix)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn transpose_matrix() {
        let array = DenseArray::new(vec![2, 3], ArrayData::Int32(vec![1, 2, 3, 4, 5, 6])).unwrap();
        let t = array.transposed().unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.data(), &ArrayData::Int32(vec![1, 4, 2, 5, 3, 6]));
        assert_eq!(t.transposed().unwrap(), array);
    }

    #[test]
    fn transpose_three_dimensions_reverses_axes() {
        let data = ArrayData::Int64((0..24).collect());
        let array = DenseArray::new(vec![2, 3, 4], data).unwrap();
        let t = array.transposed().unwrap();
        assert_eq!(t.shape(), &[4, 3, 2]);
        // t[k][j][i] == a[i][j][k]; a[1][2][3] = 1*12 + 2*4 + 3 = 23
        let ArrayData::Int64(values) = t.data() else {
            panic!("type changed");
        };
        assert_eq!(values[3 * 6 + 2 * 2 + 1], 23);
        assert_eq!(values[1], 12);
    }

    #[test]
    fn transpose_zero_extent_axis() {
        let array = DenseArray::new(vec![0, 3], ArrayData::Float64(Vec::new())).unwrap();
        let t = array.transposed().unwrap();
        assert_eq!(t.shape(), &[3, 0]);
        assert!(t.data().is_empty());
    }

    #[test]
    fn shape_must_match_buffer() {
        let err = DenseArray::new(vec![2, 2], ArrayData::Float64(vec![1.0])).unwrap_err();
        assert_matches!(err, SomaError::InvalidInput(_));
    }

    #[test]
    fn coo_bounds_checked() {
        let err = CooMatrix::new([2, 2], vec![2], vec![0], ArrayData::Float64(vec![1.0]))
            .unwrap_err();
        assert_matches!(err, SomaError::InvalidInput(_));
    }

    #[test]
    fn from_dense_keeps_nonzero_row_major() {
        let array =
            DenseArray::from_rows(&[vec![0.0, 2.0], vec![3.0, 0.0], vec![0.0, 5.0]]).unwrap();
        let coo = CooMatrix::from_dense(&array).unwrap();
        assert_eq!(coo.shape(), [3, 2]);
        assert_eq!(coo.rows(), &[0, 1, 2]);
        assert_eq!(coo.cols(), &[1, 0, 1]);
        assert_eq!(coo.values(), Some(&ArrayData::Float64(vec![2.0, 3.0, 5.0])));
    }

    #[test]
    fn cast_rejects_out_of_range() {
        let data = ArrayData::Int64(vec![1, 300]);
        assert_matches!(data.cast(ElementType::Uint8), Err(SomaError::TypeMismatch(_)));
        let data = ArrayData::Float64(vec![1.9, -2.5]);
        assert_eq!(data.cast(ElementType::Int32).unwrap(), ArrayData::Int32(vec![1, -2]));
        assert_matches!(
            ArrayData::Float64(vec![f64::NAN]).cast(ElementType::Int64),
            Err(SomaError::TypeMismatch(_))
        );
        assert_matches!(
            ArrayData::Float64(vec![1.0, 1e300]).cast(ElementType::Float32),
            Err(SomaError::TypeMismatch(_))
        );
        let narrowed = ArrayData::Float64(vec![f64::NAN, f64::NEG_INFINITY])
            .cast(ElementType::Float32)
            .unwrap();
        let ArrayData::Float32(values) = narrowed else {
            panic!("expected float32");
        };
        assert!(values[0].is_nan());
        assert_eq!(values[1], f32::NEG_INFINITY);
    }

    #[test]
    fn non_finite_floats_survive_json() {
        let data = ArrayData::Float64(vec![0.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(
            json,
            r#"{"type":"float64","values":[0.5,"NaN","Infinity","-Infinity"]}"#
        );
        let ArrayData::Float64(values) = serde_json::from_str(&json).unwrap() else {
            panic!("expected float64");
        };
        assert_eq!(values[0], 0.5);
        assert!(values[1].is_nan());
        assert_eq!(values[2], f64::INFINITY);
        assert_eq!(values[3], f64::NEG_INFINITY);
    }

    #[test]
    fn deserialize_validates() {
        let json = r#"{"shape":[2,2],"rows":[0,5],"cols":[0,1],"values":{"type":"float64","values":[1.0,2.0]}}"#;
        assert!(serde_json::from_str::<CooMatrix>(json).is_err());
        let json = r#"{"shape":[2,2],"rows":[0,1],"cols":[0,1],"structure":"symmetric"}"#;
        let coo: CooMatrix = serde_json::from_str(json).unwrap();
        assert!(coo.is_pattern());
        assert_eq!(coo.structure(), MatrixStructure::Symmetric);
    }
}
