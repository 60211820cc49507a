use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::ingest::WriteSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize)]
struct RootResult<'a> {
    storage_root: &'a str,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &WriteSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_root(root: &Utf8Path) -> io::Result<()> {
        Self::print_json(&RootResult {
            storage_root: root.as_str(),
        })
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &WriteSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(Self::render_summary(summary).as_bytes())
    }

    pub fn render_summary(summary: &WriteSummary) -> String {
        let mut out = format!("{} {}\n", summary.object_type, summary.uri);
        if let Some(element_type) = summary.element_type {
            out.push_str(&format!("  type: {element_type}\n"));
        }
        if !summary.shape.is_empty() {
            let shape = summary
                .shape
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(" x ");
            out.push_str(&format!("  shape: {shape}\n"));
        }
        if !summary.columns.is_empty() {
            out.push_str(&format!("  columns: {}\n", summary.columns.join(", ")));
        }
        if !summary.index_column_names.is_empty() {
            out.push_str(&format!(
                "  indexed by: {}\n",
                summary.index_column_names.join(", ")
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ElementType, ObjectType};

    #[test]
    fn render_array_summary() {
        let summary = WriteSummary {
            uri: "/data/X".to_string(),
            object_type: ObjectType::SparseNdarray,
            element_type: Some(ElementType::Float32),
            shape: vec![3, 4],
            columns: Vec::new(),
            index_column_names: Vec::new(),
        };
        assert_eq!(
            TextOutput::render_summary(&summary),
            "sparse_ndarray /data/X\n  type: float32\n  shape: 3 x 4\n"
        );
    }
}
