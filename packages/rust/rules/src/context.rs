//! Cell context: the flat, typed snapshot of a cell that predicates read.

use std::cell::OnceCell;

use serde_json::Value;

use jupytutor_shared::CellKind;

use crate::notebook::{CellHandle, NotebookHandle};

/// Derived, read-only view of one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellContext {
    pub kind: CellKind,
    pub text: String,
    pub editable: bool,
    /// String tags in metadata order.
    pub tags: Vec<String>,
    /// Extracted text of all outputs (code cells only), newline separated.
    pub output_text: String,
    pub has_error: bool,
}

/// Index → context resolution used by the predicate evaluator.
pub trait ContextLookup {
    /// Context of the cell at `index`, or `None` when out of range.
    fn context(&self, index: i64) -> Option<&CellContext>;
}

impl ContextLookup for &[CellContext] {
    fn context(&self, index: i64) -> Option<&CellContext> {
        usize::try_from(index).ok().and_then(|i| self.get(i))
    }
}

/// Build the context for one cell.
///
/// Non-empty output texts are joined with a single `\n`, not a blank line.
pub fn build(cell: &dyn CellHandle) -> CellContext {
    let kind = cell.kind();

    let editable = cell
        .metadata("editable")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let tags = cell
        .metadata("tags")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let (output_text, has_error) = if kind == CellKind::Code {
        let outputs = cell.outputs();
        let text = outputs
            .iter()
            .map(extract_output_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let has_error = outputs
            .iter()
            .any(|o| o.get("output_type").and_then(Value::as_str) == Some("error"));
        (text, has_error)
    } else {
        (String::new(), false)
    };

    CellContext {
        kind,
        text: cell.source().into_owned(),
        editable,
        tags,
        output_text,
        has_error,
    }
}

/// Text of one output record: `data["text/plain"]`, then `text`, then
/// `evalue`, then the whole record serialised.
fn extract_output_text(output: &Value) -> String {
    output
        .get("data")
        .and_then(|d| d.get("text/plain"))
        .and_then(join_lines)
        .or_else(|| output.get("text").and_then(join_lines))
        .or_else(|| {
            output.get("evalue").and_then(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| output.to_string())
}

/// A string, or an array of lines joined with `\n`. Empty results count as missing.
fn join_lines(value: &Value) -> Option<String> {
    let joined = match value {
        Value::String(s) => s.clone(),
        Value::Array(lines) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    (!joined.is_empty()).then_some(joined)
}

// ---------------------------------------------------------------------------
// Per-pass memo
// ---------------------------------------------------------------------------

/// Lazily built contexts for one resolution pass over a notebook.
///
/// Each cell is built at most once; the cache is dropped with the pass.
pub struct CellContextCache<'a> {
    notebook: &'a dyn NotebookHandle,
    slots: Vec<OnceCell<CellContext>>,
}

impl<'a> CellContextCache<'a> {
    pub fn new(notebook: &'a dyn NotebookHandle) -> Self {
        let slots = (0..notebook.cell_count()).map(|_| OnceCell::new()).collect();
        Self { notebook, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl ContextLookup for CellContextCache<'_> {
    fn context(&self, index: i64) -> Option<&CellContext> {
        let index = usize::try_from(index).ok()?;
        let slot = self.slots.get(index)?;
        let cell = self.notebook.cell(index)?;
        Some(slot.get_or_init(|| build(cell)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::{IpynbCell, IpynbNotebook};
    use serde_json::json;

    #[test]
    fn markdown_cell_context() {
        let cell = IpynbCell::markdown("# Question 1")
            .with_metadata("tags", json!(["question", 7, "graded", null]))
            .with_metadata("editable", json!(false));
        let ctx = build(&cell);

        assert_eq!(ctx.kind, CellKind::Markdown);
        assert_eq!(ctx.text, "# Question 1");
        assert!(!ctx.editable);
        assert_eq!(ctx.tags, vec!["question", "graded"]);
        assert!(ctx.output_text.is_empty());
        assert!(!ctx.has_error);
    }

    #[test]
    fn editable_defaults_to_true() {
        let ctx = build(&IpynbCell::code("1 + 1"));
        assert!(ctx.editable);
        assert!(ctx.tags.is_empty());
    }

    #[test]
    fn raw_cells_are_unknown() {
        let cell = IpynbCell::raw("raw").with_outputs(vec![json!({"output_type": "error"})]);
        let ctx = build(&cell);
        assert_eq!(ctx.kind, CellKind::Unknown);
        assert!(!ctx.has_error);
    }

    #[test]
    fn output_text_precedence() {
        let cell = IpynbCell::code("run()").with_outputs(vec![
            json!({"output_type": "execute_result", "data": {"text/plain": ["a", "b"]}, "text": "ignored"}),
            json!({"output_type": "stream", "name": "stdout", "text": "printed\n"}),
            json!({"output_type": "error", "ename": "ZeroDivisionError", "evalue": "division by zero", "traceback": []}),
            json!({"output_type": "display_data", "data": {"image/png": "AAAA"}}),
        ]);
        let ctx = build(&cell);

        let parts: Vec<&str> = ctx.output_text.split('\n').collect();
        assert_eq!(&parts[..4], &["a", "b", "printed", ""]);
        assert!(ctx.output_text.contains("division by zero"));
        assert!(ctx.output_text.contains("image/png"));
        assert!(ctx.has_error);
    }

    #[test]
    fn non_string_evalue_is_stringified() {
        let cell = IpynbCell::code("x").with_outputs(vec![json!({"output_type": "error", "evalue": 42})]);
        assert_eq!(build(&cell).output_text, "42");
    }

    #[test]
    fn cache_is_bounded_by_notebook() {
        let nb = IpynbNotebook::new(vec![IpynbCell::code("a"), IpynbCell::markdown("b")]);
        let cache = CellContextCache::new(&nb);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.context(1).map(|c| c.text.as_str()), Some("b"));
        assert!(cache.context(-1).is_none());
        assert!(cache.context(2).is_none());

        let first = cache.context(0).unwrap() as *const CellContext;
        let again = cache.context(0).unwrap() as *const CellContext;
        assert_eq!(first, again, "context built once per pass");
    }
}
