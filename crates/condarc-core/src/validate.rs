//! Checking a merged configuration against the schema
//!
//! Validation never fails: problems become [`Diagnostic`]s in a
//! [`ValidationReport`], and the merged values stay usable.

use std::fmt;

use condarc_content::{KeyPath, Value};
use serde::Serialize;

use crate::merge::MergedConfig;
use crate::schema::{
    MergeStrategy, SchemaEntry, SchemaRegistry, UnknownKeyPolicy, ValueCheck, ValueType,
};

/// Diagnostic codes.
pub mod codes {
    pub const TYPE_MISMATCH: &str = "type.mismatch";
    pub const CONSTRAINT: &str = "value.constraint";
    pub const UNKNOWN_KEY: &str = "key.unknown";
    pub const UNREADABLE: &str = "source.unreadable";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// One problem found in the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub key: String,
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    /// The source that supplied the offending value, when known.
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(key: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            severity: Severity::Error,
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn warning(key: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(key, code, message)
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.key, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " (from {source})")?;
        }
        Ok(())
    }
}

/// All diagnostics of one resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Diagnostics for one key.
    pub fn for_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| d.key == key)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}: {diagnostic}", diagnostic.severity)?;
        }
        Ok(())
    }
}

/// Checks merged values and prospective writes against a schema
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    schema: &'a SchemaRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(schema: &'a SchemaRegistry) -> Self {
        Self { schema }
    }

    /// Check every key of a merged configuration.
    pub fn validate(&self, config: &MergedConfig) -> ValidationReport {
        let mut report = ValidationReport::new();
        for (key, _) in config.iter() {
            let path = KeyPath::from_segments([key]);
            self.check_node(config, &path, &mut report);
        }
        report
    }

    fn check_node(&self, config: &MergedConfig, path: &KeyPath, report: &mut ValidationReport) {
        let Some(value) = config.get(path).filter(|v| !v.is_null()) else {
            return;
        };
        let source = config
            .provenance(path)
            .last()
            .map(|c| c.origin.to_string());
        let attach = |d: Diagnostic| match &source {
            Some(s) => d.with_source(s.clone()),
            None => d,
        };

        let Some(entry) = self.schema.lookup(path) else {
            if let Some(d) = self.unknown(path) {
                report.push(attach(d));
            }
            return;
        };

        // Appended lists hide what each source wrote
        if let MergeStrategy::Append { .. } = entry.strategy() {
            let ty = entry.value_type();
            let mut rejected = false;
            for contribution in config.provenance(path) {
                if ty.check(&contribution.value) == ValueCheck::Rejected {
                    rejected = true;
                    report.push(
                        Diagnostic::error(
                            path.to_string(),
                            codes::TYPE_MISMATCH,
                            format!("expected {ty}, found {}", describe(&contribution.value)),
                        )
                        .with_source(contribution.origin.to_string()),
                    );
                }
            }
            if rejected {
                return;
            }
        }

        match self.check_typed(entry.value_type(), entry, path, value) {
            Err(d) => report.push(attach(d)),
            Ok(_) => {
                if let (MergeStrategy::MergeMap, Value::Map(map)) = (entry.strategy(), value) {
                    for key in map.keys() {
                        let child = path.child(key.clone());
                        if self.schema.lookup(&child).is_some() {
                            self.check_node(config, &child, report);
                        } else if !entry.allows_unknown() {
                            if let Some(d) = self.unknown(&child) {
                                report.push(attach(d));
                            }
                        }
                    }
                }
            }
        }
    }

    fn check_typed(
        &self,
        ty: &ValueType,
        entry: &SchemaEntry,
        path: &KeyPath,
        value: &Value,
    ) -> Result<Value, Diagnostic> {
        let checked = match ty.check(value) {
            ValueCheck::Exact => value.clone(),
            ValueCheck::Coerced(coerced) => coerced,
            ValueCheck::Rejected => {
                return Err(Diagnostic::error(
                    path.to_string(),
                    codes::TYPE_MISMATCH,
                    format!("expected {ty}, found {}", describe(value)),
                ));
            }
        };
        if let Some(constraint) = entry.constraint() {
            constraint.check(&checked).map_err(|message| {
                Diagnostic::error(path.to_string(), codes::CONSTRAINT, message)
            })?;
        }
        Ok(checked)
    }

    fn unknown(&self, path: &KeyPath) -> Option<Diagnostic> {
        let message = "not a recognized configuration key";
        match self.schema.policy() {
            UnknownKeyPolicy::Allow => None,
            UnknownKeyPolicy::Warn => Some(Diagnostic::warning(
                path.to_string(),
                codes::UNKNOWN_KEY,
                message,
            )),
            UnknownKeyPolicy::Deny => Some(Diagnostic::error(
                path.to_string(),
                codes::UNKNOWN_KEY,
                message,
            )),
        }
    }

    /// Check one prospective value before it is written.
    ///
    /// Returns the value after declared coercions. Unknown keys pass through
    /// unchanged unless the policy is [`UnknownKeyPolicy::Deny`].
    pub fn check_value(&self, path: &KeyPath, value: &Value) -> Result<Value, Diagnostic> {
        let path = self.schema.canonicalize(path);
        let declared = self.schema.type_for(&path).filter(|(_, entry)| {
            entry.key().len() == path.len() || entry.allows_unknown()
        });
        let Some((ty, entry)) = declared else {
            return match self.unknown(&path).filter(Diagnostic::is_error) {
                Some(d) => Err(d),
                None => Ok(value.clone()),
            };
        };

        self.check_typed(ty, entry, &path, value)
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::List(_) | Value::Map(_) => value.type_name().to_string(),
        scalar => format!("{} `{scalar}`", scalar.type_name()),
    }
}
