//! Core domain types for rule-based assistant configuration.

use serde::{Deserialize, Serialize};

use crate::predicate::Predicate;

/// Literal token inside an instructor note that is replaced by the note
/// resolved so far.
pub const PRIOR_NOTES_PLACEHOLDER: &str = "{{prior_notes}}";

// ---------------------------------------------------------------------------
// CellKind
// ---------------------------------------------------------------------------

/// Notebook cell classification used by predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
    Unknown,
}

impl CellKind {
    /// Classify a host cell type string. Anything but `code`/`markdown` is unknown.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "code" => Self::Code,
            "markdown" => Self::Markdown,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RuleConfig
// ---------------------------------------------------------------------------

/// Fully resolved assistant configuration for one cell.
///
/// Every field always has a value; [`RuleConfig::default`] is the schema default
/// that resolution starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Whether the chat assistant is available for the cell.
    #[serde(default)]
    pub chat_enabled: bool,

    /// Whether the assistant may speak up unprompted (e.g. after an error).
    #[serde(default = "default_true")]
    pub chat_proactive: bool,

    /// Free-text guidance handed to the assistant.
    #[serde(default)]
    pub instructor_note: String,

    /// Canned prompts offered to the student, in display order.
    #[serde(default)]
    pub quick_responses: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            chat_enabled: false,
            chat_proactive: true,
            instructor_note: String::new(),
            quick_responses: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A partially specified [`RuleConfig`].
///
/// `None` means the key was absent from the source document and must not
/// overwrite anything during a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRuleConfig {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub chat_enabled: Option<bool>,

    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub chat_proactive: Option<bool>,

    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub instructor_note: Option<String>,

    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub quick_responses: Option<Vec<String>>,
}

/// A key that is present must hold a real value; `null` is rejected.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// One notebook-level rule: when `when` holds (or is absent), merge `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Author's note; ignored by resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Activation condition. Absent means the rule always applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Predicate>,

    /// Keys this rule sets.
    pub config: PartialRuleConfig,
}
