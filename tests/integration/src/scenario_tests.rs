//! Scenario tests: situations administrators and users actually run into

use condarc_core::{
    ConfigResolver, ConfigStore, EnvSource, Error, NormalizedPath, ResolutionStatus, Scope,
    SchemaRegistry, SearchContext, UnknownKeyPolicy, Value, WriteError,
};
use condarc_test_utils::TestLayout;
use predicates::prelude::*;
use pretty_assertions::assert_eq;

fn context(layout: &TestLayout) -> SearchContext {
    SearchContext::empty()
        .with_system_dirs([layout.system_dir()])
        .with_conda_root(layout.conda_root())
        .with_home(layout.home())
        .with_conda_prefix(layout.prefix())
}

#[test]
fn administrator_pins_channels_for_every_user() {
    let layout = TestLayout::new();
    layout.write(
        "system/.condarc",
        "channels:  #!final\n  - https://mirror.corp/conda\nssl_verify: true\n",
    );
    layout.write("home/.condarc", "channels: [conda-forge]\nssl_verify: false\n");
    let schema = SchemaRegistry::builtin().unwrap();

    let resolver = ConfigResolver::new(&schema, context(&layout))
        .with_env(EnvSource::from_vars([("CONDA_CHANNELS", "pytorch")]));
    let store = ConfigStore::open(resolver, &[]);

    assert_eq!(
        store.get_string_list("channels").unwrap(),
        Some(vec!["https://mirror.corp/conda".to_string()])
    );
    assert_eq!(store.provenance("channels").len(), 1);
    // Without the marker later sources still win
    assert_eq!(store.get("ssl_verify"), Some(Value::Bool(false)));
}

#[test]
fn legacy_spellings_resolve_to_current_keys() {
    let layout = TestLayout::new();
    layout.write("home/.condarc", "verify_ssl: false\n");
    let schema = SchemaRegistry::builtin().unwrap();

    let resolver = ConfigResolver::new(&schema, context(&layout)).with_env(EnvSource::from_vars([
        ("CONDA_EXPERIMENTAL_SOLVER", "classic"),
        ("CONDA_SOLVER", "libmamba"),
    ]));
    let store = ConfigStore::open(resolver, &[]);

    assert_eq!(store.get_bool("ssl_verify").unwrap(), Some(false));
    assert_eq!(
        store.get_string("solver").unwrap().as_deref(),
        Some("libmamba")
    );
    let keys: Vec<&str> = store.merged().keys().collect();
    assert_eq!(keys, vec!["solver", "ssl_verify"]);
}

#[test]
fn rewriting_a_legacy_key_moves_it_to_the_current_name() {
    let layout = TestLayout::new();
    layout.write("home/.condarc", "channels: [defaults]\nverify_ssl: true\n");
    let schema = SchemaRegistry::builtin().unwrap();
    let mut store = ConfigStore::open(ConfigResolver::new(&schema, context(&layout)), &[]);

    store.set("verify_ssl", false, Scope::User).unwrap();

    assert_eq!(
        layout.read("home/.condarc"),
        "channels: [defaults]\nssl_verify: false\n"
    );
}

#[test]
fn one_broken_file_does_not_hide_the_others() {
    let layout = TestLayout::new();
    layout.write("system/.condarc", "channels: [defaults]\n");
    layout.write("home/.condarc", "channels: [conda-forge\n");
    layout.write("prefix/.condarc", "always_yes: true\n");
    let schema = SchemaRegistry::builtin().unwrap();

    let resolution = ConfigResolver::new(&schema, context(&layout)).resolve(&[]);

    assert_eq!(resolution.status(), ResolutionStatus::Unreadable);
    assert_eq!(
        resolution.merged.get(&"channels".into()),
        Some(&Value::from(vec!["defaults"]))
    );
    assert_eq!(
        resolution.merged.get(&"always_yes".into()),
        Some(&Value::Bool(true))
    );

    let broken = NormalizedPath::new(layout.path("home/.condarc")).to_string();
    let message = resolution.into_result().unwrap_err().to_string();
    assert!(
        predicate::str::contains(broken.as_str()).eval(&message),
        "{message}"
    );
}

#[test]
fn environment_lists_split_on_their_delimiters() {
    let layout = TestLayout::new();
    let schema = SchemaRegistry::builtin().unwrap();

    let resolver = ConfigResolver::new(&schema, context(&layout)).with_env(EnvSource::from_vars([
        ("CONDA_CHANNELS", "conda-forge, bioconda"),
        ("CONDA_ENVS_DIRS", "/opt/envs:/data/envs"),
        ("CONDA_PINNED_PACKAGES", "python=3.11&numpy<2"),
        ("CONDA_NOT_A_SETTING", "ignored"),
    ]));
    let store = ConfigStore::open(resolver, &[]);

    assert_eq!(
        store.get_string_list("channels").unwrap(),
        Some(vec!["conda-forge".to_string(), "bioconda".to_string()])
    );
    assert_eq!(
        store.get_string_list("envs_dirs").unwrap(),
        Some(vec!["/opt/envs".to_string(), "/data/envs".to_string()])
    );
    assert_eq!(
        store.get_string_list("pinned_packages").unwrap(),
        Some(vec!["python=3.11".to_string(), "numpy<2".to_string()])
    );
    assert!(!store.merged().contains(&"not_a_setting".into()));
}

#[test]
fn strict_mode_rejects_typos() {
    let layout = TestLayout::new();
    layout.write("home/.condarc", "chanels: [conda-forge]\n");
    let schema = SchemaRegistry::builtin()
        .unwrap()
        .with_policy(UnknownKeyPolicy::Deny);
    let mut store = ConfigStore::open(ConfigResolver::new(&schema, context(&layout)), &[]);

    assert_eq!(store.resolution().status(), ResolutionStatus::Invalid);
    let err = store.get_string_list("chanels").unwrap_err();
    assert!(matches!(err, Error::UnknownKey { .. }), "{err}");

    let err = store
        .set("chanels", Value::from(vec!["defaults"]), Scope::User)
        .unwrap_err();
    assert!(
        matches!(err, Error::Write(WriteError::UnknownKey { .. })),
        "{err}"
    );
    layout.assert_file_contains("home/.condarc", "chanels: [conda-forge]");
}

#[test]
fn variables_cannot_be_written() {
    let layout = TestLayout::new();
    let schema = SchemaRegistry::builtin().unwrap();
    let mut store = ConfigStore::open(ConfigResolver::new(&schema, context(&layout)), &[]);

    let err = store.set("always_yes", true, Scope::EnvVars).unwrap_err();
    assert!(
        matches!(
            err,
            Error::Write(WriteError::ReadOnlyScope {
                scope: Scope::EnvVars
            })
        ),
        "{err}"
    );
}
