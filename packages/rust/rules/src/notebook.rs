//! Host notebook abstractions and an nbformat (`.ipynb`) implementation.
//!
//! The resolver only sees notebooks through [`NotebookHandle`] and
//! [`CellHandle`], so a host environment can plug in its own live cell model.

use std::borrow::Cow;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use jupytutor_shared::{CellKind, JupytutorError, Result};

/// Read access to one notebook cell.
pub trait CellHandle {
    /// Cell classification.
    fn kind(&self) -> CellKind;

    /// Raw source text.
    fn source(&self) -> Cow<'_, str>;

    /// Arbitrary keyed metadata.
    fn metadata(&self, key: &str) -> Option<&Value>;

    /// Output records in their serialisable form. Empty for non-code cells.
    fn outputs(&self) -> &[Value];
}

/// Read access to a notebook: ordered cells plus notebook-level metadata.
pub trait NotebookHandle {
    fn cell_count(&self) -> usize;

    fn cell(&self, index: usize) -> Option<&dyn CellHandle>;

    fn metadata(&self, key: &str) -> Option<&Value>;
}

// ---------------------------------------------------------------------------
// nbformat
// ---------------------------------------------------------------------------

/// Multi-line text as stored by nbformat: one string or a list of lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum MultilineText {
    One(String),
    Lines(Vec<String>),
}

impl Default for MultilineText {
    fn default() -> Self {
        Self::One(String::new())
    }
}

impl MultilineText {
    fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::One(s) => Cow::Borrowed(s),
            // nbformat lines keep their own trailing newlines.
            Self::Lines(lines) => Cow::Owned(lines.concat()),
        }
    }
}

/// A cell of an nbformat-4 notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpynbCell {
    cell_type: String,

    #[serde(default)]
    source: MultilineText,

    #[serde(default)]
    metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    outputs: Vec<Value>,

    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl IpynbCell {
    fn new(cell_type: &str, source: impl Into<String>) -> Self {
        Self {
            cell_type: cell_type.to_string(),
            source: MultilineText::One(source.into()),
            metadata: Map::new(),
            outputs: Vec::new(),
            rest: Map::new(),
        }
    }

    pub fn code(source: impl Into<String>) -> Self {
        Self::new("code", source)
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self::new("markdown", source)
    }

    pub fn raw(source: impl Into<String>) -> Self {
        Self::new("raw", source)
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Value>) -> Self {
        self.outputs = outputs;
        self
    }
}

impl CellHandle for IpynbCell {
    fn kind(&self) -> CellKind {
        CellKind::from_type_name(&self.cell_type)
    }

    fn source(&self) -> Cow<'_, str> {
        self.source.as_text()
    }

    fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    fn outputs(&self) -> &[Value] {
        if self.cell_type == "code" {
            &self.outputs
        } else {
            &[]
        }
    }
}

/// An nbformat-4 notebook loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpynbNotebook {
    #[serde(default)]
    cells: Vec<IpynbCell>,

    #[serde(default)]
    metadata: Map<String, Value>,

    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl IpynbNotebook {
    pub fn new(cells: Vec<IpynbCell>) -> Self {
        Self {
            cells,
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Parse notebook JSON text.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| JupytutorError::parse(format!("invalid notebook JSON: {e}")))
    }

    /// Load a notebook file from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| JupytutorError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            JupytutorError::parse(format!("invalid notebook {}: {e}", path.display()))
        })
    }
}

impl NotebookHandle for IpynbNotebook {
    fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn cell(&self, index: usize) -> Option<&dyn CellHandle> {
        self.cells.get(index).map(|c| c as &dyn CellHandle)
    }

    fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOTEBOOK: &str = r##"{
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {"jupytutor": {"pluginEnabled": true}},
        "cells": [
            {"cell_type": "markdown", "metadata": {"tags": ["intro"]}, "source": ["# Title\n", "Read [ch 3](https://inferentialthinking.com/chapters/03/1/x.html)"]},
            {"cell_type": "code", "metadata": {}, "execution_count": 1, "source": "x = 1\nx",
             "outputs": [{"output_type": "execute_result", "data": {"text/plain": ["1"]}, "metadata": {}, "execution_count": 1}]},
            {"cell_type": "raw", "metadata": {}, "source": "raw text"}
        ]
    }"##;

    #[test]
    fn loads_nbformat_json() {
        let nb = IpynbNotebook::from_json_str(NOTEBOOK).unwrap();
        assert_eq!(nb.cell_count(), 3);
        assert_eq!(
            nb.metadata("jupytutor"),
            Some(&json!({"pluginEnabled": true}))
        );

        let md = nb.cell(0).unwrap();
        assert_eq!(md.kind(), CellKind::Markdown);
        assert!(md.source().starts_with("# Title\nRead"));
        assert!(md.outputs().is_empty());

        let code = nb.cell(1).unwrap();
        assert_eq!(code.kind(), CellKind::Code);
        assert_eq!(code.source(), "x = 1\nx");
        assert_eq!(code.outputs().len(), 1);

        assert_eq!(nb.cell(2).unwrap().kind(), CellKind::Unknown);
        assert!(nb.cell(3).is_none());
    }

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let nb = IpynbNotebook::from_json_str(NOTEBOOK).unwrap();
        let value = serde_json::to_value(&nb).unwrap();
        assert_eq!(value["nbformat"], json!(4));
        assert_eq!(value["cells"][1]["execution_count"], json!(1));
    }

    #[test]
    fn rejects_non_notebook_json() {
        assert!(IpynbNotebook::from_json_str("[1, 2]").is_err());
        assert!(IpynbNotebook::from_json_str("not json").is_err());
    }
}
