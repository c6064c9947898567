//! Combining source documents into one configuration
//!
//! Sources arrive lowest precedence first. Each top-level key is folded
//! across them with the strategy its schema entry declares:
//!
//! - **override**: the highest-precedence value wins
//! - **list append**: lists concatenate in precedence order; set-like lists
//!   put the higher-precedence items first and drop repeats
//! - **map merge**: maps merge key by key, recursing with the nested entries
//!
//! `null` means "not set here" and never takes part. A key marked
//! `#!final` ignores every later source.

use std::collections::{BTreeMap, BTreeSet};

use condarc_content::{KeyPath, Value};
use serde::Serialize;
use tracing::debug;

use crate::schema::{MergeStrategy, SchemaRegistry};
use crate::source::{Origin, SourceDocument};

/// One source's value for a key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub origin: Origin,
    pub value: Value,
}

/// Effective value of a top-level key and the sources behind it
///
/// Provenance is ordered lowest precedence first and is never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedEntry {
    pub value: Value,
    pub provenance: Vec<Contribution>,
}

/// The merged configuration, keyed by canonical top-level key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MergedConfig {
    entries: BTreeMap<String, MergedEntry>,
}

impl MergedConfig {
    /// Effective value at a path, without defaults.
    pub fn get(&self, path: &KeyPath) -> Option<&Value> {
        let (root, rest) = split_root(path)?;
        self.entries.get(root)?.value.get_path(&rest)
    }

    pub fn entry(&self, key: &str) -> Option<&MergedEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, path: &KeyPath) -> bool {
        self.get(path).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MergedEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Contributions to a path, lowest precedence first.
    ///
    /// For nested paths only the sources that set that nested key are
    /// listed, each with its own nested value.
    pub fn provenance(&self, path: &KeyPath) -> Vec<Contribution> {
        let Some((root, rest)) = split_root(path) else {
            return Vec::new();
        };
        let Some(entry) = self.entries.get(root) else {
            return Vec::new();
        };
        entry
            .provenance
            .iter()
            .filter_map(|c| {
                let value = c.value.get_path(&rest)?;
                (!value.is_null()).then(|| Contribution {
                    origin: c.origin.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Effective values as one mapping.
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.entries
                .iter()
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect(),
        )
    }

    /// Effective values over the schema defaults.
    ///
    /// A key set by any source replaces its default wholesale.
    pub fn to_value_with_defaults(&self, schema: &SchemaRegistry) -> Value {
        let mut out = schema.defaults();
        for (key, entry) in &self.entries {
            out.insert(key.clone(), entry.value.clone());
        }
        Value::Map(out)
    }
}

fn split_root(path: &KeyPath) -> Option<(&str, KeyPath)> {
    let root = path.root()?;
    let rest = KeyPath::from_segments(path.segments()[1..].iter().cloned());
    Some((root, rest))
}

/// Folds source documents into a [`MergedConfig`]
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine<'a> {
    schema: &'a SchemaRegistry,
}

impl<'a> MergeEngine<'a> {
    pub fn new(schema: &'a SchemaRegistry) -> Self {
        Self { schema }
    }

    /// Merge sources given lowest precedence first.
    pub fn merge(&self, sources: &[SourceDocument]) -> MergedConfig {
        let mut entries: BTreeMap<String, MergedEntry> = BTreeMap::new();
        let mut finals: BTreeSet<String> = BTreeSet::new();

        for source in sources {
            for (key, value) in source.document.entries() {
                if value.is_null() {
                    continue;
                }
                let key = self.schema.canonical_key(key).to_string();
                if finals.contains(&key) {
                    debug!(key = %key, source = %source.origin, "Ignoring value of a key marked final");
                    continue;
                }

                let path = KeyPath::from_segments([key.as_str()]);
                let contribution = Contribution {
                    origin: source.origin.clone(),
                    value: value.clone(),
                };
                match entries.get_mut(&key) {
                    Some(entry) => {
                        entry.value = self.combine(&path, Some(&entry.value), value);
                        entry.provenance.push(contribution);
                    }
                    None => {
                        let value = self.combine(&path, None, value);
                        entries.insert(
                            key,
                            MergedEntry {
                                value,
                                provenance: vec![contribution],
                            },
                        );
                    }
                }
            }

            for key in source.document.final_keys() {
                finals.insert(self.schema.canonical_key(key).to_string());
            }
        }

        MergedConfig { entries }
    }

    /// Combine an accumulated value with a higher-precedence one.
    ///
    /// A value that does not fit the strategy overrides when it is the
    /// higher one and is dropped when it is the lower one. The validator
    /// checks each contribution, so both cases are reported.
    fn combine(&self, path: &KeyPath, lower: Option<&Value>, higher: &Value) -> Value {
        match (self.schema.strategy_for(path), lower, higher) {
            (MergeStrategy::Append { set_like }, lower, Value::List(high)) => {
                let low = match lower {
                    Some(Value::List(low)) => low.as_slice(),
                    _ => &[],
                };
                if set_like {
                    dedupe(high.iter().chain(low))
                } else {
                    Value::List(low.iter().chain(high).cloned().collect())
                }
            }
            (MergeStrategy::MergeMap, lower, Value::Map(high)) => {
                let mut out = match lower {
                    Some(Value::Map(low)) => low.clone(),
                    _ => BTreeMap::new(),
                };
                for (key, value) in high.iter().filter(|(_, v)| !v.is_null()) {
                    let merged = self.combine(&path.child(key.clone()), out.get(key), value);
                    out.insert(key.clone(), merged);
                }
                Value::Map(out)
            }
            _ => higher.clone(),
        }
    }
}

/// Keep the first occurrence of each item.
fn dedupe<'v>(items: impl Iterator<Item = &'v Value>) -> Value {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    Value::List(out)
}
