//! Predicate evaluation.
//!
//! [`evaluate`] is total: it never panics and never errors. Out-of-range cells,
//! malformed nodes and invalid regexes all evaluate to `false`.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use jupytutor_shared::{ArrayMatch, Predicate, StringMatch};

use crate::context::{CellContext, ContextLookup};

/// Upper bound on compiled regex size for notebook-authored patterns.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Evaluate `predicate` for the cell at `current_index`.
pub fn evaluate(predicate: &Predicate, lookup: &dyn ContextLookup, current_index: i64) -> bool {
    match predicate {
        Predicate::And(items) => items.iter().all(|p| evaluate(p, lookup, current_index)),
        Predicate::Or(items) => items.iter().any(|p| evaluate(p, lookup, current_index)),
        Predicate::Not(inner) => !evaluate(inner, lookup, current_index),
        Predicate::NearbyCell { offset, predicate } => {
            let Some(target) = current_index.checked_add(*offset) else {
                return false;
            };
            if lookup.context(target).is_none() {
                return false;
            }
            evaluate(predicate, lookup, target)
        }
        Predicate::Unrecognized(raw) => {
            debug!(node = %raw, "unrecognized predicate node evaluates to false");
            false
        }
        leaf => match lookup.context(current_index) {
            Some(ctx) => evaluate_leaf(leaf, ctx),
            None => false,
        },
    }
}

fn evaluate_leaf(predicate: &Predicate, ctx: &CellContext) -> bool {
    match predicate {
        Predicate::CellType(expected) => ctx.kind.as_str() == expected,
        Predicate::Output(m) => !ctx.output_text.is_empty() && string_matches(m, &ctx.output_text),
        Predicate::HasError(expected) => ctx.has_error == *expected,
        Predicate::Content(m) => string_matches(m, &ctx.text),
        Predicate::IsEditable(expected) => ctx.editable == *expected,
        Predicate::Tags(ArrayMatch::Any(m)) => ctx.tags.iter().any(|t| string_matches(m, t)),
        Predicate::Tags(ArrayMatch::All(m)) => ctx.tags.iter().all(|t| string_matches(m, t)),
        // Combinators are dispatched by `evaluate`.
        _ => false,
    }
}

/// Apply a string matcher. Invalid regexes never match.
pub fn string_matches(matcher: &StringMatch, value: &str) -> bool {
    match matcher {
        StringMatch::Literal(expected) | StringMatch::Is(expected) => value == expected,
        StringMatch::Regex { pattern, flags } => match compile_regex(pattern, flags) {
            Some(re) => re.is_match(value),
            None => {
                debug!(pattern = %pattern, flags = %flags, "regex failed to compile, treating as non-match");
                false
            }
        },
    }
}

/// Compile a pattern with ECMAScript-style flag letters.
///
/// `i`, `m`, `s` map to the matching builder options; `u`, `g` and `y` do
/// not change a single test and are accepted. Any other letter rejects the
/// pattern.
fn compile_regex(pattern: &str, flags: &str) -> Option<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);

    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'u' | 'g' | 'y' => {}
            _ => return None,
        }
    }

    builder.build().ok()
}
