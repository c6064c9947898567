//! `CONDA_*` environment variables as the highest-precedence layer

use std::collections::BTreeMap;

use condarc_content::{ConfigDocument, KeyPath, Value};
use tracing::debug;

use crate::Result;
use crate::schema::entry::parse_bool;
use crate::schema::{SchemaRegistry, ValueType};
use crate::source::{Origin, SourceDocument};

/// Prefix of configuration variables.
pub const ENV_PREFIX: &str = "CONDA_";

/// Raw `CONDA_*` variables captured from an environment
///
/// Capturing and interpreting are separate steps: the variables are read
/// once, then turned into values against a schema when resolving, so only
/// names of known keys become configuration. `CONDA_PREFIX` and friends are
/// not configuration keys and are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSource {
    vars: BTreeMap<String, String>,
}

impl EnvSource {
    /// Capture from an explicit variable list.
    ///
    /// Names are lower-cased after the prefix; empty values are dropped.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars = vars
            .into_iter()
            .filter_map(|(name, value)| {
                let key = name.as_ref().strip_prefix(ENV_PREFIX)?.to_ascii_lowercase();
                let value = value.as_ref();
                (!key.is_empty() && !value.trim().is_empty()).then(|| (key, value.to_string()))
            })
            .collect();
        Self { vars }
    }

    /// Capture from the process environment.
    pub fn from_process_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Values of the variables naming known top-level keys, by canonical key.
    ///
    /// When both an alias and its canonical name are set, the canonical
    /// variable wins.
    pub fn values(&self, schema: &SchemaRegistry) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        let (canonical, aliased): (Vec<_>, Vec<_>) = self
            .vars
            .iter()
            .partition(|(name, _)| !schema.aliases().contains_key(name.as_str()));

        for (name, text) in canonical.into_iter().chain(aliased) {
            let path = KeyPath::from_segments([name.as_str()]);
            let Some(entry) = schema.lookup(&path).filter(|e| e.key().len() == 1) else {
                debug!(variable = %name, "Ignoring variable without a schema key");
                continue;
            };
            let value = parse_text(entry.value_type(), text, entry.delimiter());
            out.entry(entry.key().to_string()).or_insert(value);
        }
        out
    }

    /// The variables as a document of scope [`EnvVars`](crate::Scope::EnvVars),
    /// or `None` when no variable names a known key.
    pub fn to_document(&self, schema: &SchemaRegistry) -> Result<Option<SourceDocument>> {
        let values = self.values(schema);
        if values.is_empty() {
            return Ok(None);
        }
        let document = ConfigDocument::from_value(&Value::Map(values))?;
        Ok(Some(SourceDocument::new(Origin::env_vars(), document)))
    }
}

/// Interpret variable text as a value of the declared type.
///
/// Text that does not parse stays a string so the validator can report it.
fn parse_text(ty: &ValueType, text: &str, delimiter: char) -> Value {
    match ty {
        ValueType::List(inner) => Value::List(
            text.split(delimiter)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| parse_text(inner, item, delimiter))
                .collect(),
        ),
        ValueType::Map(_) | ValueType::Any => match serde_yaml::from_str::<Value>(text) {
            Ok(value @ Value::Map(_)) => value,
            _ => Value::from(text),
        },
        ValueType::OneOf(types) => types
            .iter()
            .map(|t| parse_text(t, text, delimiter))
            .find(|v| !matches!(v, Value::String(_)))
            .unwrap_or_else(|| Value::from(text)),
        scalar => parse_scalar(scalar, text.trim()).unwrap_or_else(|| Value::from(text)),
    }
}

fn parse_scalar(ty: &ValueType, text: &str) -> Option<Value> {
    match ty {
        ValueType::Bool => parse_bool(text).map(Value::Bool),
        ValueType::Int => text.parse().ok().map(Value::Int),
        ValueType::Float => text.parse().ok().map(Value::Float),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Scope;
    use pretty_assertions::assert_eq;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::builtin().unwrap()
    }

    #[test]
    fn only_known_keys_become_values() {
        let env = EnvSource::from_vars([
            ("CONDA_SSL_VERIFY", "false"),
            ("CONDA_PREFIX", "/opt/conda"),
            ("CONDA_SHLVL", "1"),
            ("PATH", "/usr/bin"),
        ]);
        let values = env.values(&schema());
        assert_eq!(values.len(), 1);
        assert_eq!(values["ssl_verify"], Value::Bool(false));
    }

    #[test]
    fn lists_split_on_their_delimiter() {
        let env = EnvSource::from_vars([
            ("CONDA_CHANNELS", "conda-forge, defaults"),
            ("CONDA_ENVS_DIRS", "/a:/b"),
            ("CONDA_PINNED_PACKAGES", "python=3.11&numpy"),
        ]);
        let values = env.values(&schema());
        assert_eq!(values["channels"], Value::from(vec!["conda-forge", "defaults"]));
        assert_eq!(values["envs_dirs"], Value::from(vec!["/a", "/b"]));
        assert_eq!(values["pinned_packages"], Value::from(vec!["python=3.11", "numpy"]));
    }

    #[test]
    fn scalars_are_coerced_per_type() {
        let env = EnvSource::from_vars([
            ("CONDA_REMOTE_MAX_RETRIES", "5"),
            ("CONDA_REMOTE_READ_TIMEOUT_SECS", "12.5"),
            ("CONDA_LOCAL_REPODATA_TTL", "true"),
            ("CONDA_ALWAYS_YES", "maybe"),
        ]);
        let values = env.values(&schema());
        assert_eq!(values["remote_max_retries"], Value::Int(5));
        assert_eq!(values["remote_read_timeout_secs"], Value::Float(12.5));
        assert_eq!(values["local_repodata_ttl"], Value::Bool(true));
        assert_eq!(values["always_yes"], Value::from("maybe"));
    }

    #[test]
    fn canonical_variable_beats_alias() {
        let env = EnvSource::from_vars([("CONDA_VERIFY_SSL", "false"), ("CONDA_SSL_VERIFY", "true")]);
        assert_eq!(env.values(&schema())["ssl_verify"], Value::Bool(true));

        let env = EnvSource::from_vars([("CONDA_YES", "yes")]);
        assert_eq!(env.values(&schema())["always_yes"], Value::Bool(true));
    }

    #[test]
    fn document_is_tagged_as_env_vars() {
        let env = EnvSource::from_vars([("CONDA_CHANNEL_PRIORITY", "strict")]);
        let source = env.to_document(&schema()).unwrap().unwrap();
        assert_eq!(source.scope(), Scope::EnvVars);
        assert_eq!(
            source.document.get(&"channel_priority".into()),
            Some(&Value::from("strict"))
        );

        assert!(EnvSource::empty().to_document(&schema()).unwrap().is_none());
    }
}
