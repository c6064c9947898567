//! Schema entries: declared type, default and merge rule of one key

use std::fmt;

use condarc_content::{KeyPath, Value};
use serde::Serialize;

/// Wildcard segment matching any key of a map.
pub const WILDCARD: &str = "*";

/// URL schemes accepted by [`Constraint::UrlScheme`].
pub const URL_SCHEMES: &[&str] = &["http", "https", "ftp", "s3", "file"];

/// Declared type of a configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Any,
    Bool,
    Int,
    Float,
    String,
    /// A string restricted to fixed choices.
    Choice(&'static [&'static str]),
    List(Box<ValueType>),
    /// A map with string keys and values of the inner type.
    Map(Box<ValueType>),
    /// The first listed type that accepts the value wins.
    OneOf(Vec<ValueType>),
}

/// Outcome of checking a value against a [`ValueType`]
#[derive(Debug, Clone, PartialEq)]
pub enum ValueCheck {
    Exact,
    /// Accepted through a declared coercion; carries the converted value.
    Coerced(Value),
    Rejected,
}

impl ValueType {
    pub fn list(inner: ValueType) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn map(inner: ValueType) -> Self {
        Self::Map(Box::new(inner))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// Type of the values stored under one key of a map of this type.
    pub fn member(&self) -> Option<&ValueType> {
        match self {
            Self::Any => Some(&Self::Any),
            Self::Map(inner) => Some(inner),
            Self::OneOf(types) => types.iter().find_map(|t| match t {
                Self::Map(inner) => Some(inner.as_ref()),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Element type of a list of this type.
    pub fn element(&self) -> Option<&ValueType> {
        match self {
            Self::Any => Some(&Self::Any),
            Self::List(inner) => Some(inner),
            _ => None,
        }
    }

    /// Check a value, applying the declared coercions.
    ///
    /// `null` is accepted by every type: it means "not set".
    pub fn check(&self, value: &Value) -> ValueCheck {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => ValueCheck::Exact,
            (Self::Bool, Value::Bool(_)) => ValueCheck::Exact,
            (Self::Bool, Value::String(s)) => match parse_bool(s) {
                Some(b) => ValueCheck::Coerced(Value::Bool(b)),
                None => ValueCheck::Rejected,
            },
            (Self::Int, Value::Int(_)) => ValueCheck::Exact,
            (Self::Float, Value::Float(_)) => ValueCheck::Exact,
            (Self::Float, Value::Int(i)) => ValueCheck::Coerced(Value::Float(*i as f64)),
            (Self::String, Value::String(_)) => ValueCheck::Exact,
            (Self::Choice(options), Value::String(s)) if options.contains(&s.as_str()) => {
                ValueCheck::Exact
            }
            (Self::List(inner), Value::List(items)) => {
                check_all(items.iter().map(|item| inner.check(item)), items.iter(), Value::List)
            }
            (Self::Map(inner), Value::Map(map)) => {
                let checks = map.values().map(|v| inner.check(v));
                let mut coerced = false;
                let mut out = map.clone();
                for ((_, slot), check) in out.iter_mut().zip(checks) {
                    match check {
                        ValueCheck::Rejected => return ValueCheck::Rejected,
                        ValueCheck::Coerced(v) => {
                            *slot = v;
                            coerced = true;
                        }
                        ValueCheck::Exact => {}
                    }
                }
                if coerced {
                    ValueCheck::Coerced(Value::Map(out))
                } else {
                    ValueCheck::Exact
                }
            }
            (Self::OneOf(types), _) => {
                let checks: Vec<_> = types.iter().map(|t| t.check(value)).collect();
                if checks.contains(&ValueCheck::Exact) {
                    return ValueCheck::Exact;
                }
                checks
                    .into_iter()
                    .find(|c| matches!(c, ValueCheck::Coerced(_)))
                    .unwrap_or(ValueCheck::Rejected)
            }
            _ => ValueCheck::Rejected,
        }
    }
}

fn check_all<'a>(
    checks: impl Iterator<Item = ValueCheck>,
    originals: impl Iterator<Item = &'a Value>,
    wrap: fn(Vec<Value>) -> Value,
) -> ValueCheck {
    let mut coerced = false;
    let mut out = Vec::new();
    for (check, original) in checks.zip(originals) {
        match check {
            ValueCheck::Rejected => return ValueCheck::Rejected,
            ValueCheck::Coerced(v) => {
                coerced = true;
                out.push(v);
            }
            ValueCheck::Exact => out.push(original.clone()),
        }
    }
    if coerced {
        ValueCheck::Coerced(wrap(out))
    } else {
        ValueCheck::Exact
    }
}

/// Boolean string literals accepted for bool keys.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::String => f.write_str("string"),
            Self::Choice(options) => write!(f, "one of [{}]", options.join(", ")),
            Self::List(inner) => write!(f, "list of {inner}"),
            Self::Map(inner) => write!(f, "map of {inner}"),
            Self::OneOf(types) => {
                let names: Vec<_> = types.iter().map(ToString::to_string).collect();
                f.write_str(&names.join(" or "))
            }
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Extra restriction applied to the leaves of an accepted value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Numbers must not be negative.
    NonNegative,
    /// Strings must be URLs with a recognized scheme.
    UrlScheme,
}

impl Constraint {
    /// Check every leaf of `value`; returns a message for the first violation.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match value {
            Value::List(items) => items.iter().try_for_each(|item| self.check(item)),
            Value::Map(map) => map.values().try_for_each(|item| self.check(item)),
            leaf => self.check_leaf(leaf),
        }
    }

    fn check_leaf(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Self::NonNegative, Value::Int(i)) if *i < 0 => {
                Err(format!("must be non-negative, got {i}"))
            }
            (Self::NonNegative, Value::Float(x)) if *x < 0.0 => {
                Err(format!("must be non-negative, got {x}"))
            }
            (Self::UrlScheme, Value::String(s)) => match s.split_once("://") {
                Some((scheme, _)) if URL_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) => {
                    Ok(())
                }
                Some((scheme, _)) => Err(format!(
                    "unrecognized URL scheme `{scheme}` in {s} (expected one of {})",
                    URL_SCHEMES.join(", ")
                )),
                None => Err(format!("{s} is not a URL")),
            },
            _ => Ok(()),
        }
    }
}

/// How values of one key from several sources combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MergeStrategy {
    /// Highest-precedence value wins.
    Override,
    /// Lists concatenate across sources.
    ///
    /// Set-like lists put the higher-precedence source's items first and
    /// drop duplicates, keeping the first occurrence.
    Append { set_like: bool },
    /// Maps merge key by key, recursing through nested entries.
    MergeMap,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => f.write_str("override"),
            Self::Append { set_like: false } => f.write_str("list-append"),
            Self::Append { set_like: true } => f.write_str("set-append"),
            Self::MergeMap => f.write_str("map-merge"),
        }
    }
}

/// Declaration of one configuration key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaEntry {
    key: KeyPath,
    value_type: ValueType,
    default: Value,
    strategy: MergeStrategy,
    allow_unknown: bool,
    constraint: Option<Constraint>,
    env_delimiter: Option<char>,
    description: String,
}

impl SchemaEntry {
    /// Declare a key; the merge strategy follows from the type.
    ///
    /// Lists append, maps merge, everything else overrides.
    pub fn new(key: &str, value_type: ValueType) -> Self {
        let strategy = match value_type {
            ValueType::List(_) => MergeStrategy::Append { set_like: false },
            ValueType::Map(_) => MergeStrategy::MergeMap,
            _ => MergeStrategy::Override,
        };
        Self {
            key: KeyPath::parse(key),
            value_type,
            default: Value::Null,
            strategy,
            allow_unknown: true,
            constraint: None,
            env_delimiter: None,
            description: String::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Append without duplicates, higher-precedence items first.
    pub fn set_like(mut self) -> Self {
        self.strategy = MergeStrategy::Append { set_like: true };
        self
    }

    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Report nested keys without their own entry as unknown.
    pub fn deny_unknown(mut self) -> Self {
        self.allow_unknown = false;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Delimiter splitting a `CONDA_<KEY>` variable into list items.
    pub fn env_delimiter(mut self, delimiter: char) -> Self {
        self.env_delimiter = Some(delimiter);
        self
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn key(&self) -> &KeyPath {
        &self.key
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    pub fn allows_unknown(&self) -> bool {
        self.allow_unknown
    }

    pub fn constraint(&self) -> Option<Constraint> {
        self.constraint
    }

    /// List delimiter for environment variables, `,` when not declared.
    pub fn delimiter(&self) -> char {
        self.env_delimiter.unwrap_or(',')
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_wildcard(&self) -> bool {
        self.key.segments().iter().any(|s| s == WILDCARD)
    }

    /// Whether this entry's key (possibly with wildcards) matches `path`.
    pub fn matches(&self, path: &KeyPath) -> bool {
        self.key.len() == path.len()
            && self
                .key
                .segments()
                .iter()
                .zip(path.segments())
                .all(|(pattern, segment)| pattern == WILDCARD || pattern == segment)
    }
}
