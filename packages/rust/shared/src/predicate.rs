//! Predicate tree used by notebook rules.
//!
//! Predicates are stored as JSON in notebook metadata. Each node is an object
//! with exactly one recognised key:
//!
//! ```json
//! {"AND": [p, ...]}   {"OR": [p, ...]}   {"NOT": p}
//! {"nearbyCell": {"offset": -1, "predicate": p}}
//! {"cellType": "code"}          {"cellType": {"is": "markdown"}}
//! {"output": m}   {"content": m}   {"hasError": true}   {"isEditable": false}
//! {"tags": {"any": m}}          {"tags": {"all": m}}
//! ```
//!
//! where `m` is `"literal"`, `{"is": "literal"}` or
//! `{"matchesRegex": {"pattern": "...", "flags": "i"}}`.
//!
//! Anything else is kept as [`Predicate::Unrecognized`] so that a malformed
//! leaf fails closed at evaluation time instead of rejecting the whole
//! configuration document.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

/// A boolean condition over one notebook cell's derived context.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Evaluate `predicate` against the cell `offset` positions away.
    NearbyCell {
        offset: i64,
        predicate: Box<Predicate>,
    },
    /// Cell type equals the expected name (`code`, `markdown`, ...).
    CellType(String),
    Output(StringMatch),
    HasError(bool),
    Content(StringMatch),
    IsEditable(bool),
    Tags(ArrayMatch),
    /// A node that matched no known shape. Always evaluates to false.
    Unrecognized(Value),
}

/// String comparison used by `output`, `content` and `tags`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringMatch {
    /// Bare JSON string: exact equality.
    Literal(String),
    /// `{"is": ...}`: exact equality, explicit form.
    Is(String),
    /// `{"matchesRegex": {"pattern", "flags"}}`.
    Regex { pattern: String, flags: String },
}

/// Quantified match over a cell's tag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayMatch {
    Any(StringMatch),
    All(StringMatch),
}

// ---------------------------------------------------------------------------
// JSON decoding
// ---------------------------------------------------------------------------

impl Predicate {
    /// Decode a predicate node. Never fails: unknown shapes become
    /// [`Predicate::Unrecognized`].
    pub fn from_value(value: &Value) -> Self {
        decode_node(value).unwrap_or_else(|| Self::Unrecognized(value.clone()))
    }

    /// Encode back to the metadata JSON shape.
    pub fn to_value(&self) -> Value {
        match self {
            Self::And(items) => json!({ "AND": items.iter().map(Self::to_value).collect::<Vec<_>>() }),
            Self::Or(items) => json!({ "OR": items.iter().map(Self::to_value).collect::<Vec<_>>() }),
            Self::Not(inner) => json!({ "NOT": inner.to_value() }),
            Self::NearbyCell { offset, predicate } => json!({
                "nearbyCell": { "offset": offset, "predicate": predicate.to_value() }
            }),
            Self::CellType(expected) => json!({ "cellType": expected }),
            Self::Output(m) => json!({ "output": m.to_value() }),
            Self::HasError(flag) => json!({ "hasError": flag }),
            Self::Content(m) => json!({ "content": m.to_value() }),
            Self::IsEditable(flag) => json!({ "isEditable": flag }),
            Self::Tags(m) => json!({ "tags": m.to_value() }),
            Self::Unrecognized(raw) => raw.clone(),
        }
    }

    /// True if this node or any descendant failed to decode.
    pub fn has_unrecognized(&self) -> bool {
        match self {
            Self::And(items) | Self::Or(items) => items.iter().any(Self::has_unrecognized),
            Self::Not(inner) => inner.has_unrecognized(),
            Self::NearbyCell { predicate, .. } => predicate.has_unrecognized(),
            Self::Unrecognized(_) => true,
            _ => false,
        }
    }
}

fn decode_node(value: &Value) -> Option<Predicate> {
    let (key, body) = single_entry(value.as_object()?)?;

    match key {
        "AND" => Some(Predicate::And(decode_list(body)?)),
        "OR" => Some(Predicate::Or(decode_list(body)?)),
        "NOT" => Some(Predicate::Not(Box::new(Predicate::from_value(body)))),
        "nearbyCell" => {
            let obj = body.as_object()?;
            let offset = obj.get("offset")?.as_i64()?;
            let inner = obj.get("predicate")?;
            Some(Predicate::NearbyCell {
                offset,
                predicate: Box::new(Predicate::from_value(inner)),
            })
        }
        "cellType" => match StringMatch::from_value(body)? {
            StringMatch::Literal(s) | StringMatch::Is(s) => Some(Predicate::CellType(s)),
            StringMatch::Regex { .. } => None,
        },
        "output" => StringMatch::from_value(body).map(Predicate::Output),
        "content" => StringMatch::from_value(body).map(Predicate::Content),
        "hasError" => body.as_bool().map(Predicate::HasError),
        "isEditable" => body.as_bool().map(Predicate::IsEditable),
        "tags" => ArrayMatch::from_value(body).map(Predicate::Tags),
        _ => None,
    }
}

fn decode_list(body: &Value) -> Option<Vec<Predicate>> {
    body.as_array()
        .map(|items| items.iter().map(Predicate::from_value).collect())
}

/// The only `(key, value)` of a one-entry object.
fn single_entry(obj: &Map<String, Value>) -> Option<(&str, &Value)> {
    if obj.len() != 1 {
        return None;
    }
    obj.iter().next().map(|(k, v)| (k.as_str(), v))
}

impl StringMatch {
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(s) = value.as_str() {
            return Some(Self::Literal(s.to_string()));
        }

        let (key, body) = single_entry(value.as_object()?)?;
        match key {
            "is" => body.as_str().map(|s| Self::Is(s.to_string())),
            "matchesRegex" => {
                let obj = body.as_object()?;
                let pattern = obj.get("pattern")?.as_str()?.to_string();
                let flags = match obj.get("flags") {
                    None | Some(Value::Null) => String::new(),
                    Some(v) => v.as_str()?.to_string(),
                };
                Some(Self::Regex { pattern, flags })
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Literal(s) => Value::String(s.clone()),
            Self::Is(s) => json!({ "is": s }),
            Self::Regex { pattern, flags } => {
                json!({ "matchesRegex": { "pattern": pattern, "flags": flags } })
            }
        }
    }
}

impl ArrayMatch {
    pub fn from_value(value: &Value) -> Option<Self> {
        let (key, body) = single_entry(value.as_object()?)?;
        let matcher = StringMatch::from_value(body)?;
        match key {
            "any" => Some(Self::Any(matcher)),
            "all" => Some(Self::All(matcher)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Any(m) => json!({ "any": m.to_value() }),
            Self::All(m) => json!({ "all": m.to_value() }),
        }
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}
