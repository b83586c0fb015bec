//! Rule resolution: fold notebook rules and the cell's own override into one
//! [`RuleConfig`].

use serde_json::Value;
use tracing::{debug, instrument};

use jupytutor_shared::{
    PLUGIN_METADATA_KEY, PRIOR_NOTES_PLACEHOLDER, PartialRuleConfig, Rule, RuleConfig,
};

use crate::context::CellContextCache;
use crate::notebook::{CellHandle, NotebookHandle};
use crate::predicate::evaluate;

/// Merge `update` into `current`.
///
/// Every key present in `update` replaces the current value, except that an
/// instructor note containing `{{prior_notes}}` has its first occurrence
/// replaced by the current note instead.
pub fn merge(current: &RuleConfig, update: &PartialRuleConfig) -> RuleConfig {
    let mut merged = current.clone();

    if let Some(enabled) = update.chat_enabled {
        merged.chat_enabled = enabled;
    }
    if let Some(proactive) = update.chat_proactive {
        merged.chat_proactive = proactive;
    }
    if let Some(note) = &update.instructor_note {
        merged.instructor_note = if note.contains(PRIOR_NOTES_PLACEHOLDER) {
            note.replacen(PRIOR_NOTES_PLACEHOLDER, &current.instructor_note, 1)
        } else {
            note.clone()
        };
    }
    if let Some(responses) = &update.quick_responses {
        merged.quick_responses = responses.clone();
    }

    merged
}

/// Resolve the configuration of one cell.
///
/// An out-of-range `cell_index` gets the rule result with no cell override;
/// rules whose predicates need the missing cell simply do not match.
#[instrument(skip(notebook, rules), fields(rule_count = rules.len()))]
pub fn resolve(notebook: &dyn NotebookHandle, cell_index: usize, rules: &[Rule]) -> RuleConfig {
    let cache = CellContextCache::new(notebook);
    resolve_in_pass(&cache, notebook, cell_index, rules)
}

/// Resolve every cell of the notebook in one pass, sharing built contexts.
pub fn resolve_all(notebook: &dyn NotebookHandle, rules: &[Rule]) -> Vec<RuleConfig> {
    let cache = CellContextCache::new(notebook);
    (0..notebook.cell_count())
        .map(|index| resolve_in_pass(&cache, notebook, index, rules))
        .collect()
}

fn resolve_in_pass(
    cache: &CellContextCache<'_>,
    notebook: &dyn NotebookHandle,
    cell_index: usize,
    rules: &[Rule],
) -> RuleConfig {
    let current = i64::try_from(cell_index).unwrap_or(i64::MAX);

    let from_rules = rules
        .iter()
        .enumerate()
        .filter(|(position, rule)| {
            let applies = rule
                .when
                .as_ref()
                .is_none_or(|when| evaluate(when, cache, current));
            if applies {
                debug!(rule = position, comment = rule.comment.as_deref().unwrap_or(""), "rule matched");
            }
            applies
        })
        .fold(RuleConfig::default(), |acc, (_, rule)| merge(&acc, &rule.config));

    match notebook.cell(cell_index).and_then(cell_override) {
        Some(update) => merge(&from_rules, &update),
        None => from_rules,
    }
}

/// The cell's own override from its metadata, if present and well-formed.
pub fn cell_override(cell: &dyn CellHandle) -> Option<PartialRuleConfig> {
    cell.metadata(PLUGIN_METADATA_KEY).and_then(parse_override)
}

/// Validate a raw override payload.
///
/// It must be a JSON object whose keys have the right types. An invalid
/// payload is ignored as a whole; absent keys stay absent.
pub fn parse_override(raw: &Value) -> Option<PartialRuleConfig> {
    if !raw.is_object() {
        debug!(kind = json_kind(raw), "cell override is not an object, ignoring");
        return None;
    }

    match serde_json::from_value::<PartialRuleConfig>(raw.clone()) {
        Ok(update) => Some(update),
        Err(e) => {
            debug!(error = %e, "cell override failed validation, ignoring");
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
