// Copyright (c) Facebook, Inc. and its affiliates.
//! Filter rules pruning or rewriting parameter combinations.
//!
//! In the settings document a filter list looks like:
//!
//! ```json
//! "filters": [
//!     {
//!         "match": [{"or": {"hot~": [10000], "mh~": [50]}}],
//!         "action": "remove"
//!     },
//!     {
//!         "match": [{"clients": [200]}],
//!         "action": "change",
//!         "args": {"duration": 20}
//!     }
//! ]
//! ```
//!
//! Conditions in a `match` list AND together. Within one condition object
//! every key must hold. A key ending in `~` negates membership. `and`/`or`
//! take either an object (one sub-condition per key) or a list of
//! condition objects.
use serde_json::Value;

use super::XpError;

pub const NEGATION_MARKER: char = '~';

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    KeyIn { key: String, values: Vec<Value> },
    KeyNotIn { key: String, values: Vec<Value> },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn parse(value: &Value) -> Result<Self, XpError> {
        let obj = match value.as_object() {
            Some(v) => v,
            None => {
                return Err(XpError::filter(format!(
                    "condition must be an object, got {}",
                    value
                )))
            }
        };

        let mut conds = obj
            .iter()
            .map(|(k, v)| Self::parse_entry(k, v))
            .collect::<Result<Vec<_>, _>>()?;

        if conds.len() == 1 {
            Ok(conds.pop().unwrap())
        } else {
            Ok(Condition::And(conds))
        }
    }

    fn parse_entry(key: &str, value: &Value) -> Result<Self, XpError> {
        match key {
            "and" => return Ok(Condition::And(Self::parse_nested(key, value)?)),
            "or" => return Ok(Condition::Or(Self::parse_nested(key, value)?)),
            _ => {}
        }

        let (name, negated) = match key.strip_suffix(NEGATION_MARKER) {
            Some(name) => (name, true),
            None => (key, false),
        };
        if name.is_empty() {
            return Err(XpError::filter(format!("invalid condition key {:?}", key)));
        }

        let values = match value.as_array() {
            Some(v) => v.clone(),
            None => {
                return Err(XpError::filter(format!(
                    "values for condition key {:?} must be a list, got {}",
                    key, value
                )))
            }
        };

        Ok(match negated {
            false => Condition::KeyIn {
                key: name.to_string(),
                values,
            },
            true => Condition::KeyNotIn {
                key: name.to_string(),
                values,
            },
        })
    }

    fn parse_nested(op: &str, value: &Value) -> Result<Vec<Self>, XpError> {
        match value {
            Value::Object(obj) => obj
                .iter()
                .map(|(k, v)| Self::parse_entry(k, v))
                .collect(),
            Value::Array(list) => list.iter().map(Self::parse).collect(),
            v => Err(XpError::filter(format!(
                "{:?} takes an object or a list of conditions, got {}",
                op, v
            ))),
        }
    }

    /// Parameter names referenced anywhere in this condition.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Condition::KeyIn { key, .. } | Condition::KeyNotIn { key, .. } => vec![key.as_str()],
            Condition::And(conds) | Condition::Or(conds) => {
                conds.iter().flat_map(|c| c.keys()).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterAction {
    /// Overwrite (or add) the listed parameters.
    Change(Vec<(String, Value)>),
    Remove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    pub matches: Vec<Condition>,
    pub action: FilterAction,
}

impl FilterRule {
    pub fn parse(value: &Value) -> Result<Self, XpError> {
        let obj = value
            .as_object()
            .ok_or_else(|| XpError::filter(format!("filter must be an object, got {}", value)))?;

        let matches = match obj.get("match") {
            Some(Value::Array(list)) => list
                .iter()
                .map(Condition::parse)
                .collect::<Result<Vec<_>, _>>()?,
            Some(v) => {
                return Err(XpError::filter(format!(
                    "\"match\" must be a list of conditions, got {}",
                    v
                )))
            }
            None => return Err(XpError::filter("filter is missing \"match\"")),
        };

        let action = match obj.get("action").and_then(|v| v.as_str()) {
            Some("remove") => FilterAction::Remove,
            Some("change") => match obj.get("args") {
                Some(Value::Object(args)) => FilterAction::Change(
                    args.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                ),
                _ => {
                    return Err(XpError::filter(
                        "\"change\" action requires an \"args\" object",
                    ))
                }
            },
            Some(other) => return Err(XpError::filter(format!("invalid action {:?}", other))),
            None => {
                return Err(XpError::filter(format!(
                    "filter is missing \"action\" ({})",
                    value
                )))
            }
        };

        Ok(Self { matches, action })
    }

    pub fn parse_list(value: &Value) -> Result<Vec<Self>, XpError> {
        match value {
            Value::Array(list) => list.iter().map(Self::parse).collect(),
            v => Err(XpError::filter(format!(
                "\"filters\" must be a list, got {}",
                v
            ))),
        }
    }
}
