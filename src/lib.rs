//! Normalize in-memory single-cell tables and matrices into SOMA storage
//! artifacts: indexed data frames, dense N-dimensional arrays, and COO sparse
//! arrays.
//!
//! [`ingest::Ingestor`] drives the conversion and delegates persistence to any
//! [`engine::StorageEngine`]. Two engines ship with the crate:
//! [`memory::MemoryEngine`] and the JSON-on-disk [`store::FilesystemEngine`].

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
mod float_json;
pub mod frame;
pub mod ingest;
pub mod matrix;
pub mod memory;
pub mod output;
pub mod store;
pub mod uri;
