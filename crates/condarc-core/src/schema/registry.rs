//! The immutable table of known configuration keys

use std::collections::{BTreeMap, HashMap};

use condarc_content::{KeyPath, Value};
use serde::Serialize;

use super::entry::{MergeStrategy, SchemaEntry, ValueCheck, ValueType};
use crate::error::SchemaError;

/// What happens to keys that have no schema entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeyPolicy {
    /// Pass unknown keys through silently.
    Allow,
    /// Report unknown keys as warnings.
    #[default]
    Warn,
    /// Strict mode: unknown keys are errors and cannot be written.
    Deny,
}

/// Registry of schema entries and key aliases
///
/// Built once and shared by reference; there is no way to mutate it after
/// construction.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entries: Vec<SchemaEntry>,
    index: HashMap<KeyPath, usize>,
    aliases: BTreeMap<String, String>,
    policy: UnknownKeyPolicy,
}

impl SchemaRegistry {
    /// Build a registry, checking the table for consistency.
    pub fn new<'a>(
        entries: Vec<SchemaEntry>,
        aliases: impl IntoIterator<Item = (&'a str, &'a str)>,
        policy: UnknownKeyPolicy,
    ) -> Result<Self, SchemaError> {
        let mut index = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            let key = entry.key().to_string();
            if index.insert(entry.key().clone(), i).is_some() {
                return Err(SchemaError::DuplicateKey { key });
            }
            if entry.value_type().check(entry.default_value()) == ValueCheck::Rejected {
                return Err(SchemaError::DefaultTypeMismatch {
                    key,
                    expected: entry.value_type().to_string(),
                    found: entry.default_value().type_name().to_string(),
                });
            }
            let fits = match entry.strategy() {
                MergeStrategy::Override => true,
                MergeStrategy::Append { .. } => entry.value_type().is_list(),
                MergeStrategy::MergeMap => entry.value_type().is_map(),
            };
            if !fits {
                return Err(SchemaError::StrategyMismatch {
                    key,
                    strategy: entry.strategy().to_string(),
                    value_type: entry.value_type().to_string(),
                });
            }
        }

        for entry in &entries {
            if let Some(parent) = entry.key().parent() {
                let parent_ok = index
                    .get(&parent)
                    .is_some_and(|&i| entries[i].strategy() == MergeStrategy::MergeMap);
                if !parent_ok {
                    return Err(SchemaError::OrphanNested {
                        key: entry.key().to_string(),
                        parent: parent.to_string(),
                    });
                }
            }
        }

        let mut alias_map = BTreeMap::new();
        for (alias, target) in aliases {
            if index.contains_key(&KeyPath::parse(alias)) {
                return Err(SchemaError::AliasShadowsKey {
                    alias: alias.to_string(),
                });
            }
            if !index.contains_key(&KeyPath::parse(target)) {
                return Err(SchemaError::UnknownAliasTarget {
                    alias: alias.to_string(),
                    target: target.to_string(),
                });
            }
            alias_map.insert(alias.to_string(), target.to_string());
        }

        Ok(Self {
            entries,
            index,
            aliases: alias_map,
            policy,
        })
    }

    /// Same table with a different unknown-key policy.
    pub fn with_policy(mut self, policy: UnknownKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> UnknownKeyPolicy {
        self.policy
    }

    pub fn entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter()
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    /// Canonical name of a top-level key.
    pub fn canonical_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.aliases.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Aliases that resolve to `canonical`.
    pub fn aliases_of<'a>(&'a self, canonical: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.aliases
            .iter()
            .filter(move |(_, target)| target.as_str() == canonical)
            .map(|(alias, _)| alias.as_str())
    }

    /// Rewrite an aliased first segment to its canonical key.
    pub fn canonicalize(&self, path: &KeyPath) -> KeyPath {
        match path.root().and_then(|root| self.aliases.get(root)) {
            Some(target) => path.with_root(target),
            None => path.clone(),
        }
    }

    /// Entry for a path: exact match first, then wildcard entries.
    pub fn lookup(&self, path: &KeyPath) -> Option<&SchemaEntry> {
        let path = self.canonicalize(path);
        if let Some(&i) = self.index.get(&path) {
            return Some(&self.entries[i]);
        }
        self.entries
            .iter()
            .filter(|e| e.is_wildcard())
            .find(|e| e.matches(&path))
    }

    pub fn contains(&self, path: &KeyPath) -> bool {
        self.lookup(path).is_some()
    }

    /// Merge strategy for a path; unregistered paths override.
    pub fn strategy_for(&self, path: &KeyPath) -> MergeStrategy {
        self.lookup(path)
            .map(SchemaEntry::strategy)
            .unwrap_or(MergeStrategy::Override)
    }

    /// Default value for a path.
    ///
    /// Nested paths fall back to the nearest ancestor's default map, so
    /// `custom_channels."pkgs/pro"` is answered from the default of
    /// `custom_channels`. Registered keys without a default yield `null`;
    /// unregistered keys yield `None`.
    pub fn default_for(&self, path: &KeyPath) -> Option<Value> {
        let path = self.canonicalize(path);
        let entry = self.lookup(&path);
        if let Some(entry) = entry.filter(|e| !e.default_value().is_null()) {
            return Some(entry.default_value().clone());
        }

        let segments = path.segments();
        for depth in (1..segments.len()).rev() {
            let ancestor = KeyPath::from_segments(segments[..depth].iter().cloned());
            let Some(found) = self.lookup(&ancestor) else {
                continue;
            };
            let rest = KeyPath::from_segments(segments[depth..].iter().cloned());
            if let Some(value) = found.default_value().get_path(&rest) {
                return Some(value.clone());
            }
        }

        entry.map(|_| Value::Null)
    }

    /// Declared type for a path, descending through map types when the path
    /// has no entry of its own.
    pub fn type_for(&self, path: &KeyPath) -> Option<(&ValueType, &SchemaEntry)> {
        if let Some(entry) = self.lookup(path) {
            return Some((entry.value_type(), entry));
        }
        let path = self.canonicalize(path);
        let segments = path.segments();
        for depth in (1..segments.len()).rev() {
            let ancestor = KeyPath::from_segments(segments[..depth].iter().cloned());
            if let Some(entry) = self.lookup(&ancestor) {
                let mut ty = entry.value_type();
                for _ in depth..segments.len() {
                    ty = ty.member()?;
                }
                return Some((ty, entry));
            }
        }
        None
    }

    /// Top-level defaults as a map, skipping `null` defaults.
    pub fn defaults(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .filter(|e| e.key().len() == 1 && !e.default_value().is_null())
            .map(|e| (e.key().to_string(), e.default_value().clone()))
            .collect()
    }
}
