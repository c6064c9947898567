//! Typed access to a resolution and write-back to source files
//!
//! [`ConfigStore`] keeps the latest [`Resolution`] and rebuilds it after
//! every write. Writes edit a single file in place: only the targeted key's
//! lines change, and the file is replaced atomically.

use condarc_content::{ConfigDocument, Format, KeyPath, Value};
use condarc_fs::NormalizedPath;
use tracing::{info, warn};

use crate::error::{Error, Result, WriteError};
use crate::merge::{Contribution, MergedConfig};
use crate::resolver::{ConfigResolver, Resolution};
use crate::schema::{
    MergeStrategy, SchemaEntry, SchemaRegistry, UnknownKeyPolicy, ValueCheck, ValueType,
};
use crate::source::{Scope, parse_file};
use crate::validate::{Diagnostic, ValidationReport, Validator, codes};

/// The file a write goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// The file a scope writes to, see [`SourceLocator::write_path`](crate::SourceLocator::write_path).
    Scope(Scope),
    /// A specific file; it joins the override sources if it is new.
    File(NormalizedPath),
}

impl From<Scope> for WriteTarget {
    fn from(scope: Scope) -> Self {
        Self::Scope(scope)
    }
}

impl From<NormalizedPath> for WriteTarget {
    fn from(path: NormalizedPath) -> Self {
        Self::File(path)
    }
}

/// Where [`ConfigStore::add_item`] places a new list item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// Front of the list: highest priority for channel-like keys.
    Prepend,
    Append,
}

/// Resolved configuration with typed getters and setters
#[derive(Debug)]
pub struct ConfigStore<'a> {
    resolver: ConfigResolver<'a>,
    explicit: Vec<NormalizedPath>,
    resolution: Resolution,
}

impl<'a> ConfigStore<'a> {
    /// Resolve once and keep the result.
    pub fn open(resolver: ConfigResolver<'a>, explicit: &[NormalizedPath]) -> Self {
        let resolution = resolver.resolve(explicit);
        Self {
            resolver,
            explicit: explicit.to_vec(),
            resolution,
        }
    }

    pub fn schema(&self) -> &'a SchemaRegistry {
        self.resolver.schema()
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn merged(&self) -> &MergedConfig {
        &self.resolution.merged
    }

    pub fn report(&self) -> &ValidationReport {
        &self.resolution.report
    }

    /// Explicit override files, including files added by writes.
    pub fn explicit_paths(&self) -> &[NormalizedPath] {
        &self.explicit
    }

    /// Re-read every source.
    pub fn reload(&mut self) {
        self.resolution = self.resolver.resolve(&self.explicit);
    }

    /// Effective value at a path, falling back to the schema default.
    ///
    /// `None` only for keys that are neither registered nor set anywhere.
    pub fn get(&self, path: impl Into<KeyPath>) -> Option<Value> {
        let path = self.schema().canonicalize(&path.into());
        match self.merged().get(&path) {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => self.schema().default_for(&path),
        }
    }

    pub fn get_bool(&self, path: impl Into<KeyPath>) -> Result<Option<bool>> {
        self.typed(path.into(), &ValueType::Bool, Value::as_bool)
    }

    pub fn get_int(&self, path: impl Into<KeyPath>) -> Result<Option<i64>> {
        self.typed(path.into(), &ValueType::Int, Value::as_i64)
    }

    pub fn get_float(&self, path: impl Into<KeyPath>) -> Result<Option<f64>> {
        self.typed(path.into(), &ValueType::Float, Value::as_f64)
    }

    pub fn get_string(&self, path: impl Into<KeyPath>) -> Result<Option<String>> {
        self.typed(path.into(), &ValueType::String, |v| v.as_str().map(str::to_string))
    }

    pub fn get_string_list(&self, path: impl Into<KeyPath>) -> Result<Option<Vec<String>>> {
        self.typed(path.into(), &ValueType::list(ValueType::String), |v| {
            v.as_list()?
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect()
        })
    }

    /// Names of the configured channels, highest priority first.
    ///
    /// A mapping entry contributes its first key: `- http://localhost: {type: local}`
    /// names `http://localhost`.
    pub fn channel_names(&self) -> Result<Vec<String>> {
        let path = KeyPath::from("channels");
        let Some(value) = self.get(&path).filter(|v| !v.is_null()) else {
            return Ok(Vec::new());
        };
        let mismatch = |found: &Value| Error::TypeMismatch {
            key: path.to_string(),
            expected: "list of channel names or mappings".to_string(),
            found: found.type_name().to_string(),
        };
        let items = value.as_list().ok_or_else(|| mismatch(&value))?;
        items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(Some(name.clone())),
                Value::Map(map) => Ok(map.keys().next().cloned()),
                other => Err(mismatch(other)),
            })
            .filter_map(Result::transpose)
            .collect()
    }

    fn typed<T>(
        &self,
        path: KeyPath,
        ty: &ValueType,
        extract: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<T>> {
        let schema = self.schema();
        if schema.policy() == UnknownKeyPolicy::Deny && schema.type_for(&path).is_none() {
            return Err(Error::UnknownKey {
                key: path.to_string(),
            });
        }
        let Some(value) = self.get(&path).filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let mismatch = || Error::TypeMismatch {
            key: path.to_string(),
            expected: ty.to_string(),
            found: value.type_name().to_string(),
        };
        let checked = match ty.check(&value) {
            ValueCheck::Exact => value.clone(),
            ValueCheck::Coerced(coerced) => coerced,
            ValueCheck::Rejected => return Err(mismatch()),
        };
        extract(&checked).map(Some).ok_or_else(mismatch)
    }

    /// Schema entry of a key.
    pub fn describe(&self, path: impl Into<KeyPath>) -> Option<&'a SchemaEntry> {
        self.schema().lookup(&path.into())
    }

    /// Sources that contributed to a key, lowest precedence first.
    pub fn provenance(&self, path: impl Into<KeyPath>) -> Vec<Contribution> {
        let path = self.schema().canonicalize(&path.into());
        self.merged().provenance(&path)
    }

    /// Write a value into the target file and re-resolve.
    ///
    /// The value is validated and coerced first. Aliased keys are written
    /// under their canonical name, and alias spellings of the same key in
    /// the target file are dropped. A higher-precedence source can still
    /// shadow the written value; [`get`](Self::get) reports the effective one.
    pub fn set(
        &mut self,
        path: impl Into<KeyPath>,
        value: impl Into<Value>,
        target: impl Into<WriteTarget>,
    ) -> Result<NormalizedPath> {
        let path = self.canonical_for_write(path.into());
        let value = self.check(&path, &value.into())?;
        let schema = self.schema();
        let written = value.clone();
        let file = self.edit(target.into(), |document| {
            let document = drop_aliases(schema, document, &path)?;
            Ok(document.with_value(&path, value)?)
        })?;
        let overrides = self.schema().strategy_for(&path) == MergeStrategy::Override;
        if overrides && self.merged().get(&path) != Some(&written) {
            if let Some(winner) = self.provenance(&path).last() {
                warn!(
                    key = %path,
                    source = %winner.origin,
                    "Written value is shadowed by a higher-precedence source"
                );
            }
        }
        Ok(file)
    }

    /// Remove a key from the target file and re-resolve.
    pub fn remove(
        &mut self,
        path: impl Into<KeyPath>,
        target: impl Into<WriteTarget>,
    ) -> Result<NormalizedPath> {
        let path = self.canonical_for_write(path.into());
        let schema = self.schema();
        self.edit(target.into(), |document| {
            let mut spellings = vec![path.clone()];
            if path.len() == 1 {
                spellings.extend(schema.aliases_of(&path.to_string()).map(KeyPath::from));
            }
            let mut document = document;
            let mut removed = false;
            for spelling in &spellings {
                if document.contains(spelling) {
                    document = document.without_key(spelling)?;
                    removed = true;
                }
            }
            if !removed {
                return Err(WriteError::KeyNotFound {
                    key: path.to_string(),
                    path: origin_label(&document),
                }
                .into());
            }
            Ok(document)
        })
    }

    /// Insert an item into a list key of the target file.
    ///
    /// For set-like keys an item already present moves to the requested end
    /// instead of appearing twice. Lines of the other items are kept as they
    /// are, comments included.
    pub fn add_item(
        &mut self,
        path: impl Into<KeyPath>,
        item: impl Into<Value>,
        target: impl Into<WriteTarget>,
        position: InsertPosition,
    ) -> Result<NormalizedPath> {
        let path = self.canonical_for_write(path.into());
        self.require_list(&path)?;
        let item = item.into();
        let set_like = self.schema().strategy_for(&path) == MergeStrategy::Append { set_like: true };
        let validator = Validator::new(self.schema());
        let schema = self.schema();

        self.edit(target.into(), |document| {
            let mut document = drop_aliases(schema, document, &path)?;
            let mut items = list_in(&document, &path)?;
            if set_like && items.contains(&item) {
                document = document.without_list_item(&path, &item)?;
                items.retain(|existing| existing != &item);
            }
            let index = match position {
                InsertPosition::Prepend => 0,
                InsertPosition::Append => items.len(),
            };
            items.insert(index, item.clone());
            let checked = validator
                .check_value(&path, &Value::List(items.clone()))
                .map_err(write_error)?;
            // Coercion touched the list: write it whole
            if checked != Value::List(items) {
                return Ok(document.with_value(&path, checked)?);
            }
            Ok(document.with_list_item(&path, index, item)?)
        })
    }

    /// Remove every occurrence of an item from a list key of the target file.
    pub fn remove_item(
        &mut self,
        path: impl Into<KeyPath>,
        item: impl Into<Value>,
        target: impl Into<WriteTarget>,
    ) -> Result<NormalizedPath> {
        let path = self.canonical_for_write(path.into());
        self.require_list(&path)?;
        let item = item.into();

        self.edit(target.into(), |document| {
            if !list_in(&document, &path)?.contains(&item) {
                return Err(WriteError::ItemNotFound {
                    key: path.to_string(),
                    item: item.to_string(),
                }
                .into());
            }
            Ok(document.without_list_item(&path, &item)?)
        })
    }

    fn canonical_for_write(&self, requested: KeyPath) -> KeyPath {
        let path = self.schema().canonicalize(&requested);
        if let (Some(alias), Some(canonical)) = (requested.root(), path.root()) {
            if alias != canonical {
                warn!("Key {alias} is an alias of {canonical}; setting value with latter");
            }
        }
        path
    }

    fn check(&self, path: &KeyPath, value: &Value) -> Result<Value> {
        Validator::new(self.schema())
            .check_value(path, value)
            .map_err(write_error)
    }

    fn require_list(&self, path: &KeyPath) -> Result<()> {
        match self.schema().type_for(path) {
            Some((ty, _)) if !ty.is_list() && *ty != ValueType::Any => Err(WriteError::NotAList {
                key: path.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn target_path(&self, target: &WriteTarget) -> Result<NormalizedPath> {
        match target {
            WriteTarget::File(path) => Ok(path.clone()),
            WriteTarget::Scope(Scope::EnvVars) => Err(WriteError::ReadOnlyScope {
                scope: Scope::EnvVars,
            }
            .into()),
            WriteTarget::Scope(scope) => self
                .resolver
                .locator()
                .write_path(*scope)
                .ok_or_else(|| WriteError::NoPathForScope { scope: *scope }.into()),
        }
    }

    /// Load the target, apply `change`, write atomically and re-resolve.
    fn edit(
        &mut self,
        target: WriteTarget,
        change: impl FnOnce(ConfigDocument) -> Result<ConfigDocument>,
    ) -> Result<NormalizedPath> {
        let path = self.target_path(&target)?;
        if condarc_fs::io::is_read_only(&path) {
            return Err(not_writable(&path, None));
        }
        if path.is_dir() {
            return Err(malformed(&path, "is a directory"));
        }

        let existing = condarc_fs::io::read_text_if_exists(&path)
            .map_err(|e| not_writable(&path, Some(e)))?;
        let document = match existing {
            Some(text) => parse_file(&path, &text).map_err(|e| malformed(&path, &e.to_string()))?,
            None => new_document(&path)?,
        };
        let updated = change(document.with_origin(path.to_native()))?;
        condarc_fs::io::write_text(&path, &updated.to_string())
            .map_err(|e| not_writable(&path, Some(e)))?;
        info!(path = %path, "Wrote configuration file");

        if let WriteTarget::File(file) = &target {
            let known = self.resolution.document_for(file).is_some() || self.explicit.contains(file);
            if !known {
                self.explicit.push(file.clone());
            }
        }
        self.reload();
        Ok(path)
    }
}

fn write_error(diagnostic: Diagnostic) -> Error {
    let error = if diagnostic.code == codes::UNKNOWN_KEY {
        WriteError::UnknownKey {
            key: diagnostic.key,
        }
    } else {
        WriteError::Invalid {
            key: diagnostic.key,
            message: diagnostic.message,
        }
    };
    error.into()
}

fn not_writable(path: &NormalizedPath, source: Option<condarc_fs::Error>) -> Error {
    WriteError::NotWritable {
        path: path.to_string(),
        source,
    }
    .into()
}

fn malformed(path: &NormalizedPath, message: &str) -> Error {
    WriteError::MalformedTarget {
        path: path.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// An empty document in the format the file name implies.
fn new_document(path: &NormalizedPath) -> Result<ConfigDocument> {
    match path.extension().and_then(Format::from_extension) {
        Some(Format::Json) => ConfigDocument::parse_as("{}\n", Format::Json)
            .map_err(|e| malformed(path, &e.to_string())),
        _ => Ok(ConfigDocument::empty()),
    }
}

fn origin_label(document: &ConfigDocument) -> String {
    document
        .origin()
        .map(|p| NormalizedPath::new(p).to_string())
        .unwrap_or_default()
}

/// Remove alias spellings of `path`'s top-level key.
fn drop_aliases(
    schema: &SchemaRegistry,
    mut document: ConfigDocument,
    path: &KeyPath,
) -> Result<ConfigDocument> {
    let Some(root) = path.root() else {
        return Ok(document);
    };
    for alias in schema.aliases_of(root) {
        let alias_path = KeyPath::from_segments([alias]);
        if document.contains(&alias_path) {
            document = document.without_key(&alias_path)?;
        }
    }
    Ok(document)
}

/// The list stored at `path` in one document; empty when unset.
fn list_in(document: &ConfigDocument, path: &KeyPath) -> Result<Vec<Value>> {
    match document.get(path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::List(items)) => Ok(items.clone()),
        Some(_) => Err(WriteError::NotAList {
            key: path.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::SearchContext;
    use condarc_test_utils::TestLayout;
    use pretty_assertions::assert_eq;

    fn store<'a>(schema: &'a SchemaRegistry, layout: &TestLayout) -> ConfigStore<'a> {
        let context = SearchContext::empty()
            .with_home(layout.home())
            .with_system_dirs([layout.system_dir()])
            .with_conda_prefix(layout.prefix());
        ConfigStore::open(ConfigResolver::new(schema, context), &[])
    }

    #[test]
    fn get_falls_back_to_defaults() {
        let layout = TestLayout::new();
        let schema = SchemaRegistry::builtin().unwrap();
        let store = store(&schema, &layout);

        assert_eq!(store.get("ssl_verify"), Some(Value::Bool(true)));
        assert_eq!(store.get("channels"), Some(Value::from(vec!["defaults"])));
        assert_eq!(store.get("proxy_servers"), Some(Value::Null));
        assert_eq!(store.get("not_a_key"), None);
        assert_eq!(store.get_bool("verify_ssl").unwrap(), Some(true));
    }

    #[test]
    fn typed_getters_coerce_or_fail() {
        let layout = TestLayout::new();
        layout.write(
            "home/.condarc",
            "ssl_verify: 'off'\nremote_max_retries: 5\nremote_read_timeout_secs: 30\nsolver: 3\n",
        );
        let schema = SchemaRegistry::builtin().unwrap();
        let store = store(&schema, &layout);

        assert_eq!(store.get_bool("ssl_verify").unwrap(), Some(false));
        assert_eq!(store.get_int("remote_max_retries").unwrap(), Some(5));
        assert_eq!(store.get_float("remote_read_timeout_secs").unwrap(), Some(30.0));
        assert_eq!(
            store.get_string_list("channels").unwrap(),
            Some(vec!["defaults".to_string()])
        );
        let err = store.get_string("solver").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }), "{err}");
        assert_eq!(store.get_string("client_ssl_cert").unwrap(), None);
    }

    #[test]
    fn set_edits_only_the_target_key() {
        let layout = TestLayout::new();
        layout.write(
            "home/.condarc",
            "# my settings\nchannels:\n  - conda-forge  # primary\nssl_verify: true\n",
        );
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        store.set("ssl_verify", false, Scope::User).unwrap();

        assert_eq!(
            layout.read("home/.condarc"),
            "# my settings\nchannels:\n  - conda-forge  # primary\nssl_verify: false\n"
        );
        assert_eq!(store.get_bool("ssl_verify").unwrap(), Some(false));
    }

    #[test]
    fn set_writes_aliases_under_the_canonical_key() {
        let layout = TestLayout::new();
        layout.write("home/.condarc", "verify_ssl: true\n");
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        store.set("verify_ssl", "no", Scope::User).unwrap();

        assert_eq!(layout.read("home/.condarc"), "ssl_verify: false\n");
    }

    #[test]
    fn set_rejects_invalid_values() {
        let layout = TestLayout::new();
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        let err = store.set("channel_priority", "loose", Scope::User).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::Invalid { .. })), "{err}");
        let err = store.set("remote_max_retries", -1, Scope::User).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::Invalid { .. })), "{err}");
        layout.assert_file_not_exists("home/.condarc");
    }

    #[test]
    fn set_rejects_unknown_keys_in_strict_mode() {
        let layout = TestLayout::new();
        let schema = SchemaRegistry::builtin()
            .unwrap()
            .with_policy(UnknownKeyPolicy::Deny);
        let mut store = store(&schema, &layout);

        let err = store.set("mystery", 1, Scope::User).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::UnknownKey { .. })), "{err}");
        let err = store.get_int("mystery").unwrap_err();
        assert!(matches!(err, Error::UnknownKey { .. }), "{err}");
    }

    #[test]
    fn env_vars_scope_is_read_only() {
        let layout = TestLayout::new();
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        let err = store.set("quiet", true, Scope::EnvVars).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::ReadOnlyScope { .. })));
        let err = store.set("quiet", true, Scope::Override).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::NoPathForScope { .. })));
    }

    #[test]
    fn malformed_targets_are_left_alone() {
        let layout = TestLayout::new();
        layout.write("prefix/.condarc", "channels: [a\n");
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        let err = store.set("quiet", true, Scope::Environment).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::MalformedTarget { .. })), "{err}");
        assert_eq!(layout.read("prefix/.condarc"), "channels: [a\n");
    }

    #[test]
    fn new_explicit_files_join_the_sources() {
        let layout = TestLayout::new();
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);
        let file = NormalizedPath::new(layout.path("extra/override.yml"));

        store.set("offline", true, file.clone()).unwrap();

        assert_eq!(store.explicit_paths(), &[file.clone()]);
        assert_eq!(store.get_bool("offline").unwrap(), Some(true));
        assert_eq!(store.provenance("offline")[0].origin.scope, Scope::Override);
    }

    #[test]
    fn add_item_moves_existing_set_like_items() {
        let layout = TestLayout::new();
        layout.write("home/.condarc", "channels:\n  - defaults\n  - conda-forge\n");
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        store
            .add_item("channels", "conda-forge", Scope::User, InsertPosition::Prepend)
            .unwrap();
        store
            .add_item("channels", "bioconda", Scope::User, InsertPosition::Append)
            .unwrap();

        assert_eq!(
            store.get_string_list("channels").unwrap().unwrap(),
            vec!["conda-forge", "defaults", "bioconda"]
        );
    }

    #[test]
    fn add_item_refuses_scalar_keys() {
        let layout = TestLayout::new();
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        let err = store
            .add_item("ssl_verify", "x", Scope::User, InsertPosition::Append)
            .unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::NotAList { .. })));
    }

    #[test]
    fn remove_item_and_remove_key() {
        let layout = TestLayout::new();
        layout.write("home/.condarc", "channels: [a, b]\nquiet: true\n");
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        store.remove_item("channels", "a", Scope::User).unwrap();
        assert_eq!(store.get_string_list("channels").unwrap().unwrap(), vec!["b"]);

        let err = store.remove_item("channels", "zzz", Scope::User).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::ItemNotFound { .. })));

        store.remove("quiet", Scope::User).unwrap();
        assert_eq!(store.get_bool("quiet").unwrap(), Some(false));
        let err = store.remove("quiet", Scope::User).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::KeyNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn read_only_targets_are_refused() {
        let layout = TestLayout::new();
        layout.write("home/.condarc", "quiet: false\n");
        layout.make_read_only("home/.condarc");
        let schema = SchemaRegistry::builtin().unwrap();
        let mut store = store(&schema, &layout);

        let err = store.set("quiet", true, Scope::User).unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::NotWritable { .. })));
        assert_eq!(layout.read("home/.condarc"), "quiet: false\n");
    }
}
