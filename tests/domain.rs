use assert_matches::assert_matches;

use soma_ingest::domain::{ElementType, ObjectType};
use soma_ingest::error::SomaError;
use soma_ingest::frame::ColumnValues;
use soma_ingest::ingest::SomaInput;
use soma_ingest::matrix::{ArrayData, MatrixStructure};

#[test]
fn parse_object_type() {
    let kind: ObjectType = "Measurement".parse().unwrap();
    assert_eq!(kind, ObjectType::Measurement);
    assert_matches!(
        "table".parse::<ObjectType>(),
        Err(SomaError::InvalidObjectType(_))
    );
}

#[test]
fn element_type_display_round_trips() {
    for element_type in [
        ElementType::Bool,
        ElementType::Uint8,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::Utf8,
    ] {
        assert_eq!(element_type.to_string().parse::<ElementType>().unwrap(), element_type);
    }
}

#[test]
fn decode_tabular_input() {
    let json = r#"{
        "kind": "tabular",
        "columns": [
            {"name": "tissue", "values": {"type": "categorical", "values": {"codes": [0, 0], "categories": ["lung"]}}},
            {"name": "depth", "values": {"type": "float64", "values": [1.5, 2.5]}}
        ],
        "row_names": ["c1", "c2"]
    }"#;
    let input: SomaInput = serde_json::from_str(json).unwrap();
    let SomaInput::Tabular(frame) = input else {
        panic!("expected tabular input");
    };
    assert_eq!(frame.n_rows(), 2);
    assert_eq!(frame.row_names(), vec!["c1", "c2"]);
    assert!(frame.column("tissue").unwrap().values.is_categorical());
    assert_eq!(
        frame.column("depth").unwrap().values,
        ColumnValues::Float64(vec![1.5, 2.5])
    );
}

#[test]
fn decode_sparse_input() {
    let json = r#"{
        "kind": "sparse_coordinate",
        "shape": [3, 3],
        "rows": [0, 1, 2],
        "cols": [0, 2, 1],
        "values": {"type": "float64", "values": [1.0, 2.0, 3.0]}
    }"#;
    let input: SomaInput = serde_json::from_str(json).unwrap();
    let SomaInput::SparseCoordinate(matrix) = input else {
        panic!("expected sparse input");
    };
    assert_eq!(matrix.nnz(), 3);
    assert_eq!(matrix.structure(), MatrixStructure::General);
    assert_eq!(matrix.values(), Some(&ArrayData::Float64(vec![1.0, 2.0, 3.0])));
}

#[test]
fn decode_rejects_ragged_dense_input() {
    let json = r#"{
        "kind": "dense_numeric",
        "shape": [2, 2],
        "data": {"type": "int32", "values": [1, 2, 3]}
    }"#;
    assert!(serde_json::from_str::<SomaInput>(json).is_err());
}
