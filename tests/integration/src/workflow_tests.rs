//! Integration tests for the read, inspect and write workflow
//!
//! Each test builds a throwaway search tree, describes it through the same
//! variables a shell would export, and drives the public API end to end.

use condarc_core::{
    ConfigResolver, ConfigStore, EnvSource, InsertPosition, NormalizedPath, ResolutionStatus,
    Scope, SchemaRegistry, SearchContext, Value,
};
use condarc_test_utils::TestLayout;
use pretty_assertions::assert_eq;

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Variables describing `layout` the way a shell session would.
fn shell_vars(layout: &TestLayout) -> Vec<(String, String)> {
    vec![
        ("HOME".into(), layout.home().display().to_string()),
        ("CONDA_ROOT".into(), layout.conda_root().display().to_string()),
        ("CONDA_PREFIX".into(), layout.prefix().display().to_string()),
    ]
}

fn context(layout: &TestLayout, vars: &[(String, String)]) -> SearchContext {
    SearchContext::from_vars(vars.iter().cloned()).with_system_dirs([layout.system_dir()])
}

fn label(path: impl AsRef<std::path::Path>) -> String {
    NormalizedPath::new(path).to_string()
}

// =============================================================================
// Reading
// =============================================================================

#[test]
fn shell_environment_drives_the_search() {
    let layout = TestLayout::new();
    layout.write("conda_root/.condarc", "channels: [defaults]\nauto_update_conda: false\n");
    layout.write("home/.condarc", "channels: [conda-forge]\n");
    layout.write("prefix/.condarc", "channels: [bioconda]\n");
    let override_file = layout.write("ci/condarc.yml", "always_yes: true\n");

    let mut vars = shell_vars(&layout);
    vars.push(("CONDARC".into(), override_file.display().to_string()));
    vars.push(("CONDA_CHANNEL_PRIORITY".into(), "strict".into()));
    let schema = SchemaRegistry::builtin().unwrap();

    let resolver = ConfigResolver::new(&schema, context(&layout, &vars))
        .with_env(EnvSource::from_vars(vars.iter().cloned()));
    let store = ConfigStore::open(resolver, &[]);

    assert_eq!(store.resolution().status(), ResolutionStatus::Clean);
    assert_eq!(
        store.get_string_list("channels").unwrap(),
        Some(vec![
            "bioconda".to_string(),
            "conda-forge".to_string(),
            "defaults".to_string()
        ])
    );
    assert_eq!(store.get_bool("always_yes").unwrap(), Some(true));
    assert_eq!(store.get_bool("auto_update_conda").unwrap(), Some(false));
    assert_eq!(
        store.get_string("channel_priority").unwrap().as_deref(),
        Some("strict")
    );
    // Unset keys fall back to defaults
    assert_eq!(store.get_bool("ssl_verify").unwrap(), Some(true));

    let scopes: Vec<Scope> = store.resolution().sources().map(|o| o.scope).collect();
    assert_eq!(
        scopes,
        vec![
            Scope::System,
            Scope::User,
            Scope::Environment,
            Scope::Override,
            Scope::EnvVars
        ]
    );
}

#[test]
fn provenance_serializes_for_display() {
    let layout = TestLayout::new();
    let user = layout.write("home/.condarc", "channels: [conda-forge]\n");
    let env = layout.write("prefix/.condarc", "channels: [bioconda]\n");
    let schema = SchemaRegistry::builtin().unwrap();
    let store = ConfigStore::open(
        ConfigResolver::new(&schema, context(&layout, &shell_vars(&layout))),
        &[],
    );

    let dumped = serde_json::to_value(store.merged()).unwrap();

    assert_eq!(
        dumped,
        serde_json::json!({
            "channels": {
                "value": ["bioconda", "conda-forge"],
                "provenance": [
                    {
                        "origin": {"scope": "user", "location": label(&user)},
                        "value": ["conda-forge"]
                    },
                    {
                        "origin": {"scope": "environment", "location": label(&env)},
                        "value": ["bioconda"]
                    }
                ]
            }
        })
    );
}

#[test]
fn report_explains_every_problem() {
    let layout = TestLayout::new();
    layout.write(
        "home/.condarc",
        "ssl_verify: maybe\nproxy_servers:\n  https: proxy.local:3128\nshow_channel_url: true\n",
    );
    let schema = SchemaRegistry::builtin().unwrap();
    let resolver = ConfigResolver::new(&schema, context(&layout, &shell_vars(&layout)));

    let resolution = resolver.resolve(&[]);

    assert_eq!(resolution.status(), ResolutionStatus::Invalid);
    let keys: Vec<&str> = resolution.report.errors().map(|d| d.key.as_str()).collect();
    assert_eq!(keys, vec!["proxy_servers", "ssl_verify"]);
    let rendered = resolution.report.to_string();
    assert!(rendered.contains("maybe"), "{rendered}");
    assert!(rendered.contains("proxy.local:3128"), "{rendered}");
    assert!(rendered.contains(&label(layout.path("home/.condarc"))), "{rendered}");
}

// =============================================================================
// Writing
// =============================================================================

#[test]
fn edits_round_trip_through_the_store() {
    let layout = TestLayout::new();
    layout.write(
        "home/.condarc",
        "# managed by hand\nchannels:\n  - defaults  # base\n\nssl_verify: true\n",
    );
    let schema = SchemaRegistry::builtin().unwrap();
    let mut store = ConfigStore::open(
        ConfigResolver::new(&schema, context(&layout, &shell_vars(&layout))),
        &[],
    );

    store
        .add_item("channels", "conda-forge", Scope::User, InsertPosition::Prepend)
        .unwrap();
    store.set("ssl_verify", "false", Scope::User).unwrap();

    assert_eq!(
        layout.read("home/.condarc"),
        "# managed by hand\nchannels:\n  - conda-forge\n  - defaults  # base\n\nssl_verify: false\n"
    );
    assert_eq!(store.get("ssl_verify"), Some(Value::Bool(false)));

    store.remove_item("channels", "conda-forge", Scope::User).unwrap();
    store.remove("ssl_verify", Scope::User).unwrap();
    assert_eq!(store.get("ssl_verify"), Some(Value::Bool(true)));
    layout.assert_file_contains("home/.condarc", "# managed by hand");
}

#[test]
fn each_scope_writes_its_own_file() {
    let layout = TestLayout::new();
    let schema = SchemaRegistry::builtin().unwrap();
    let mut store = ConfigStore::open(
        ConfigResolver::new(&schema, context(&layout, &shell_vars(&layout))),
        &[],
    );

    store.set("remote_max_retries", 1, Scope::System).unwrap();
    store.set("remote_max_retries", 2, Scope::User).unwrap();
    store.set("remote_max_retries", 3, Scope::Environment).unwrap();

    layout.assert_file_contains("conda_root/.condarc", "remote_max_retries: 1");
    layout.assert_file_contains("home/.condarc", "remote_max_retries: 2");
    layout.assert_file_contains("prefix/.condarc", "remote_max_retries: 3");
    layout.assert_file_not_exists("system/.condarc");
    assert_eq!(store.get_int("remote_max_retries").unwrap(), Some(3));
    assert_eq!(store.provenance("remote_max_retries").len(), 3);
}
