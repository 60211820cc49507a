//! In-memory tabular input and the column schema inferred from it.

use serde::{Deserialize, Serialize};

use crate::domain::ElementType;
use crate::error::SomaError;

pub const SOMA_JOINID: &str = "soma_joinid";

/// Values of a single column.
///
/// `Complex` and `List` exist because upstream tables carry them; the storage
/// type system has no representation for either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum ColumnValues {
    Text(Vec<String>),
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(#[serde(with = "crate::float_json")] Vec<f32>),
    Float64(#[serde(with = "crate::float_json")] Vec<f64>),
    /// Integer codes into `categories`; `-1` marks a missing value.
    Categorical {
        codes: Vec<i32>,
        categories: Vec<String>,
    },
    Complex(Vec<[f64; 2]>),
    List(Vec<Vec<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Text(v) => v.len(),
            ColumnValues::Bool(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float32(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Categorical { codes, .. } => codes.len(),
            ColumnValues::Complex(v) => v.len(),
            ColumnValues::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnValues::Categorical { .. })
    }

    /// Storage type of the column, or `None` when it cannot be represented.
    /// Categorical columns report the type of their labels.
    pub fn element_type(&self) -> Option<ElementType> {
        match self {
            ColumnValues::Text(_) | ColumnValues::Categorical { .. } => Some(ElementType::Utf8),
            ColumnValues::Bool(_) => Some(ElementType::Bool),
            ColumnValues::Int32(_) => Some(ElementType::Int32),
            ColumnValues::Int64(_) => Some(ElementType::Int64),
            ColumnValues::Float32(_) => Some(ElementType::Float32),
            ColumnValues::Float64(_) => Some(ElementType::Float64),
            ColumnValues::Complex(_) | ColumnValues::List(_) => None,
        }
    }

    /// Replace categorical codes with their labels. Other kinds are returned as is.
    pub fn decode_categories(self) -> Result<ColumnValues, SomaError> {
        let ColumnValues::Categorical { codes, categories } = self else {
            return Ok(self);
        };
        let labels = codes
            .into_iter()
            .map(|code| match code {
                -1 => Ok(String::new()),
                code => usize::try_from(code)
                    .ok()
                    .and_then(|i| categories.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        SomaError::InvalidInput(format!(
                            "category code {code} out of range for {} categories",
                            categories.len()
                        ))
                    }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ColumnValues::Text(labels))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A table of equal-length named columns with optional row labels.
///
/// `index` names the column that identifies rows, when the producer of the
/// table already knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DataFrameRepr")]
pub struct DataFrame {
    columns: Vec<Column>,
    row_names: Option<Vec<String>>,
    index: Option<String>,
}

#[derive(Deserialize)]
struct DataFrameRepr {
    columns: Vec<Column>,
    #[serde(default)]
    row_names: Option<Vec<String>>,
    #[serde(default)]
    index: Option<String>,
}

impl TryFrom<DataFrameRepr> for DataFrame {
    type Error = SomaError;

    fn try_from(repr: DataFrameRepr) -> Result<Self, Self::Error> {
        let mut frame = DataFrame::new(repr.columns)?;
        if let Some(row_names) = repr.row_names {
            frame = frame.with_row_names(row_names)?;
        }
        frame.index = repr.index;
        Ok(frame)
    }
}

impl DataFrame {
    pub fn new(columns: Vec<Column>) -> Result<Self, SomaError> {
        if let Some(first) = columns.first() {
            let n_rows = first.values.len();
            if let Some(bad) = columns.iter().find(|col| col.values.len() != n_rows) {
                return Err(SomaError::InvalidInput(format!(
                    "column '{}' has {} rows, expected {n_rows}",
                    bad.name,
                    bad.values.len()
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = columns.iter().find(|col| !seen.insert(col.name.as_str())) {
            return Err(SomaError::InvalidInput(format!(
                "duplicate column name '{}'",
                dup.name
            )));
        }
        Ok(Self {
            columns,
            row_names: None,
            index: None,
        })
    }

    pub fn with_row_names(mut self, row_names: Vec<String>) -> Result<Self, SomaError> {
        if !self.columns.is_empty() && row_names.len() != self.n_rows() {
            return Err(SomaError::InvalidInput(format!(
                "{} row names for {} rows",
                row_names.len(),
                self.n_rows()
            )));
        }
        self.row_names = Some(row_names);
        Ok(self)
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn n_rows(&self) -> usize {
        match self.columns.first() {
            Some(col) => col.values.len(),
            None => self.row_names.as_ref().map_or(0, Vec::len),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|col| col.name.as_str())
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// Row labels; positional `"0".."n-1"` when none were supplied.
    pub fn row_names(&self) -> Vec<String> {
        match &self.row_names {
            Some(names) => names.clone(),
            None => (0..self.n_rows()).map(|i| i.to_string()).collect(),
        }
    }

    /// Append a column. Its length must match the table, unless the table is
    /// still empty.
    pub fn push_column(&mut self, column: Column) -> Result<(), SomaError> {
        if self.has_column(&column.name) {
            return Err(SomaError::InvalidInput(format!(
                "duplicate column name '{}'",
                column.name
            )));
        }
        let expected = self.n_rows();
        let defined = !self.columns.is_empty() || self.row_names.is_some();
        if defined && column.values.len() != expected {
            return Err(SomaError::InvalidInput(format!(
                "column '{}' has {} rows, expected {expected}",
                column.name,
                column.values.len()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub(crate) fn set_index(&mut self, index: String) {
        self.index = Some(index);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub element_type: ElementType,
}

/// Ordered column schema handed to the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    /// Infer the storage type of every column. Fails listing every column
    /// whose type cannot be represented, not just the first.
    pub fn infer(frame: &DataFrame) -> Result<Self, SomaError> {
        let mut fields = Vec::with_capacity(frame.columns().len());
        let mut unsupported = Vec::new();
        for column in frame.columns() {
            match column.values.element_type() {
                Some(element_type) => fields.push(Field {
                    name: column.name.clone(),
                    element_type,
                }),
                None => unsupported.push(column.name.clone()),
            }
        }
        if !unsupported.is_empty() {
            return Err(SomaError::UnsupportedColumns(unsupported));
        }
        Ok(Self { fields })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn text(values: &[&str]) -> ColumnValues {
        ColumnValues::Text(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn decode_categorical() {
        let values = ColumnValues::Categorical {
            codes: vec![1, 0, -1],
            categories: vec!["B".to_string(), "T".to_string()],
        };
        assert_eq!(values.decode_categories().unwrap(), text(&["T", "B", ""]));
    }

    #[test]
    fn decode_rejects_bad_code() {
        let values = ColumnValues::Categorical {
            codes: vec![3],
            categories: vec!["B".to_string()],
        };
        assert_matches!(values.decode_categories(), Err(SomaError::InvalidInput(_)));
    }

    #[test]
    fn infer_collects_every_unsupported_column() {
        let frame = DataFrame::new(vec![
            Column::new("z", ColumnValues::Complex(vec![[1.0, 0.0]])),
            Column::new("ok", ColumnValues::Int32(vec![1])),
            Column::new("tags", ColumnValues::List(vec![vec!["a".to_string()]])),
        ])
        .unwrap();
        let err = Schema::infer(&frame).unwrap_err();
        assert_matches!(err, SomaError::UnsupportedColumns(cols) if cols == vec!["z", "tags"]);
    }

    #[test]
    fn unequal_columns_rejected() {
        let err = DataFrame::new(vec![
            Column::new("a", ColumnValues::Int32(vec![1, 2])),
            Column::new("b", ColumnValues::Int32(vec![1])),
        ])
        .unwrap_err();
        assert_matches!(err, SomaError::InvalidInput(_));
    }

    #[test]
    fn default_row_names_are_positional() {
        let frame = DataFrame::new(vec![Column::new("a", text(&["x", "y"]))]).unwrap();
        assert_eq!(frame.row_names(), vec!["0", "1"]);
    }
}
