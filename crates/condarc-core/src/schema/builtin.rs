//! The built-in conda key table

use condarc_content::Value;
use serde_json::json;

use super::entry::{Constraint, MergeStrategy, SchemaEntry, ValueType};
use super::registry::{SchemaRegistry, UnknownKeyPolicy};
use crate::error::SchemaError;

/// Legacy and shorthand key names, rewritten to their canonical key.
pub const ALIASES: &[(&str, &str)] = &[
    ("channel", "channels"),
    ("add_binstar_token", "add_anaconda_token"),
    ("envs_path", "envs_dirs"),
    ("client_cert", "client_ssl_cert"),
    ("client_cert_key", "client_ssl_cert_key"),
    ("verify_ssl", "ssl_verify"),
    ("self_update", "auto_update_conda"),
    ("disallow", "disallowed_packages"),
    ("copy", "always_copy"),
    ("softlink", "always_softlink"),
    ("binstar_upload", "anaconda_upload"),
    ("conda-build", "conda_build"),
    ("yes", "always_yes"),
    ("verbose", "verbosity"),
    ("experimental_solver", "solver"),
];

const CHANNEL_PRIORITY: &[&str] = &["flexible", "strict", "disabled"];
const PATH_CONFLICT: &[&str] = &["clobber", "warn", "prevent"];
const SAFETY_CHECKS: &[&str] = &["warn", "enabled", "disabled"];
const SOLVERS: &[&str] = &["classic", "libmamba"];

fn strings() -> ValueType {
    ValueType::list(ValueType::String)
}

fn flag(key: &str, default: bool, description: &str) -> SchemaEntry {
    SchemaEntry::new(key, ValueType::Bool)
        .with_default(default)
        .described(description)
}

fn count(key: &str, default: i64, description: &str) -> SchemaEntry {
    SchemaEntry::new(key, ValueType::Int)
        .with_default(default)
        .with_constraint(Constraint::NonNegative)
        .described(description)
}

fn path_list(key: &str, description: &str) -> SchemaEntry {
    SchemaEntry::new(key, strings()).set_like().described(description)
}

/// A channel name, or a one-key mapping from a channel name to its settings.
fn channel_list() -> ValueType {
    ValueType::list(ValueType::OneOf(vec![
        ValueType::String,
        ValueType::map(ValueType::map(ValueType::String)),
    ]))
}

fn channel_entries() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::new("channels", channel_list())
            .set_like()
            .with_default(vec!["defaults"])
            .described("Channels searched for packages, highest priority first"),
        SchemaEntry::new("channel_alias", ValueType::String)
            .with_default("https://conda.anaconda.org")
            .with_constraint(Constraint::UrlScheme)
            .described("URL prepended to bare channel names"),
        SchemaEntry::new("default_channels", strings())
            .set_like()
            .with_default(vec![
                "https://repo.anaconda.com/pkgs/main",
                "https://repo.anaconda.com/pkgs/r",
            ])
            .with_constraint(Constraint::UrlScheme)
            .described("Channels the `defaults` channel expands to"),
        flag(
            "override_channels_enabled",
            true,
            "Allow --override-channels on the command line",
        ),
        flag("use_local", false, "Search the local conda-build channel"),
        path_list(
            "allowlist_channels",
            "The only channels packages may come from",
        ),
        SchemaEntry::new("custom_channels", ValueType::map(ValueType::String))
            .with_default(Value::from(json!({"pkgs/pro": "https://repo.anaconda.com"})))
            .with_constraint(Constraint::UrlScheme)
            .described("Channel name to base URL mapping"),
        SchemaEntry::new(
            "custom_multichannels",
            ValueType::map(ValueType::list(ValueType::String)),
        )
        .described("Names that expand to several channels"),
        SchemaEntry::new("custom_multichannels.*", strings())
            .set_like()
            .described("Channels one multichannel expands to"),
        SchemaEntry::new("migrated_channel_aliases", strings())
            .set_like()
            .with_constraint(Constraint::UrlScheme)
            .described("Former channel aliases rewritten to channel_alias"),
        SchemaEntry::new("migrated_custom_channels", ValueType::map(ValueType::String))
            .described("Former custom channel locations"),
        flag(
            "add_anaconda_token",
            true,
            "Add anaconda.org tokens to channel URLs",
        ),
        flag(
            "allow_non_channel_urls",
            false,
            "Warn instead of failing on URLs that are not channels",
        ),
        flag(
            "restore_free_channel",
            false,
            "Add the retired free channel back to defaults",
        ),
        SchemaEntry::new("repodata_fns", strings())
            .with_strategy(MergeStrategy::Override)
            .with_default(vec!["current_repodata.json", "repodata.json"])
            .described("Repodata file names tried in order"),
        SchemaEntry::new("use_only_tar_bz2", ValueType::Bool)
            .described("Only consider .tar.bz2 packages"),
        count("repodata_threads", 0, "Threads used to fetch repodata"),
    ]
}

fn directory_entries() -> Vec<SchemaEntry> {
    vec![
        path_list("envs_dirs", "Directories holding named environments").env_delimiter(':'),
        path_list("pkgs_dirs", "Package cache directories"),
        count("default_threads", 0, "Default number of worker threads"),
        SchemaEntry::new("bld_path", ValueType::String)
            .with_default("")
            .described("Directory for conda-build output"),
        SchemaEntry::new("croot", ValueType::String)
            .with_default("")
            .described("conda-build root directory"),
    ]
}

fn network_entries() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::new("client_ssl_cert", ValueType::String)
            .described("Client certificate for TLS connections"),
        SchemaEntry::new("client_ssl_cert_key", ValueType::String)
            .described("Key of the client certificate"),
        SchemaEntry::new(
            "local_repodata_ttl",
            ValueType::OneOf(vec![ValueType::Int, ValueType::Bool]),
        )
        .with_default(1)
        .with_constraint(Constraint::NonNegative)
        .described("Seconds cached repodata stays fresh; true follows the server"),
        flag("offline", false, "Never touch the network"),
        SchemaEntry::new("proxy_servers", ValueType::map(ValueType::String))
            .with_constraint(Constraint::UrlScheme)
            .described("Proxy URL per protocol or host"),
        SchemaEntry::new("remote_connect_timeout_secs", ValueType::Float)
            .with_default(9.15)
            .with_constraint(Constraint::NonNegative)
            .described("Seconds to wait for a connection"),
        count("remote_max_retries", 3, "Retries for failed HTTP requests"),
        count("remote_backoff_factor", 1, "Backoff factor between retries"),
        SchemaEntry::new("remote_read_timeout_secs", ValueType::Float)
            .with_default(60.0)
            .with_constraint(Constraint::NonNegative)
            .described("Seconds to wait for data"),
        flag("ssl_verify", true, "Verify TLS certificates"),
    ]
}

fn package_entries() -> Vec<SchemaEntry> {
    vec![
        path_list(
            "aggressive_update_packages",
            "Packages updated whenever the environment changes",
        )
        .with_default(vec!["ca-certificates", "certifi", "openssl"]),
        flag("auto_update_conda", true, "Update conda when possible"),
        SchemaEntry::new("channel_priority", ValueType::Choice(CHANNEL_PRIORITY))
            .with_default("flexible")
            .described("How channel order affects the solver"),
        path_list(
            "create_default_packages",
            "Packages added to every new environment",
        ),
        path_list("disallowed_packages", "Packages that may never be installed")
            .env_delimiter('&'),
        flag("force_reinstall", false, "Reinstall packages already present"),
        path_list("pinned_packages", "Package specs kept fixed").env_delimiter('&'),
        flag(
            "pip_interop_enabled",
            false,
            "Consider pip-installed packages when solving",
        ),
        path_list("track_features", "Features tracked in every environment"),
        SchemaEntry::new("solver", ValueType::Choice(SOLVERS))
            .with_default("classic")
            .described("Solver backend"),
    ]
}

fn linking_entries() -> Vec<SchemaEntry> {
    vec![
        flag("allow_softlinks", false, "Allow soft links when hard links fail"),
        flag("always_copy", false, "Copy files instead of linking"),
        flag("always_softlink", false, "Always soft link files"),
        SchemaEntry::new("path_conflict", ValueType::Choice(PATH_CONFLICT))
            .with_default("clobber")
            .described("What to do when two packages write the same path"),
        flag("rollback_enabled", true, "Roll back failed transactions"),
        SchemaEntry::new("safety_checks", ValueType::Choice(SAFETY_CHECKS))
            .with_default("warn")
            .described("Package integrity verification"),
        flag(
            "extra_safety_checks",
            false,
            "Verify package checksums after extraction",
        ),
        SchemaEntry::new("signing_metadata_url_base", ValueType::String)
            .with_constraint(Constraint::UrlScheme)
            .described("Base URL of content trust metadata"),
        flag("shortcuts", true, "Create menu shortcuts"),
        flag("non_admin_enabled", true, "Allow non-admin installs"),
        flag(
            "separate_format_cache",
            false,
            "Keep .conda and .tar.bz2 caches apart",
        ),
        count("verify_threads", 0, "Threads verifying packages"),
        count("execute_threads", 0, "Threads running link actions"),
    ]
}

fn output_entries() -> Vec<SchemaEntry> {
    vec![
        flag(
            "anaconda_upload",
            false,
            "Upload conda-build output to anaconda.org",
        ),
        SchemaEntry::new("conda_build", ValueType::map(ValueType::Any))
            .described("Settings passed to conda-build"),
        flag("always_yes", false, "Answer yes to every prompt"),
        flag("auto_activate_base", true, "Activate base in new shells"),
        count("auto_stack", 0, "Depth of automatic environment stacking"),
        flag("changeps1", true, "Show the active environment in the prompt"),
        SchemaEntry::new("env_prompt", ValueType::String)
            .with_default("({default_env})")
            .described("Template of the environment prompt"),
        flag("json", false, "Machine-readable output"),
        flag(
            "notify_outdated_conda",
            true,
            "Warn when a newer conda exists",
        ),
        flag("quiet", false, "Hide progress output"),
        flag("report_errors", false, "Send error reports"),
        SchemaEntry::new("show_channel_urls", ValueType::Bool)
            .described("Print channel URLs next to packages"),
        count("verbosity", 0, "Logging verbosity level"),
        flag(
            "unsatisfiable_hints",
            true,
            "Explain unsatisfiable requests",
        ),
        count(
            "unsatisfiable_hints_check_depth",
            2,
            "Search depth of unsatisfiable hints",
        ),
    ]
}

impl SchemaRegistry {
    /// Registry of conda's own keys, with the default [`UnknownKeyPolicy`].
    pub fn builtin() -> Result<Self, SchemaError> {
        let entries = [
            channel_entries(),
            directory_entries(),
            network_entries(),
            package_entries(),
            linking_entries(),
            output_entries(),
        ]
        .into_iter()
        .flatten()
        .collect();
        Self::new(entries, ALIASES.iter().copied(), UnknownKeyPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueCheck;
    use condarc_content::KeyPath;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn builtin_table_is_consistent() {
        let schema = SchemaRegistry::builtin().unwrap();
        assert_eq!(schema.aliases().len(), ALIASES.len());
        assert_eq!(schema.policy(), UnknownKeyPolicy::Warn);
    }

    #[test]
    fn every_list_key_is_set_like_except_repodata_fns() {
        let schema = SchemaRegistry::builtin().unwrap();
        for entry in schema.entries().filter(|e| e.value_type().is_list()) {
            let expected = if entry.key().to_string() == "repodata_fns" {
                MergeStrategy::Override
            } else {
                MergeStrategy::Append { set_like: true }
            };
            assert_eq!(entry.strategy(), expected, "{}", entry.key());
        }
    }

    #[rstest]
    #[case("channel", "channels")]
    #[case("verify_ssl", "ssl_verify")]
    #[case("conda-build", "conda_build")]
    #[case("experimental_solver", "solver")]
    #[case("channels", "channels")]
    fn aliases_are_canonicalized(#[case] alias: &str, #[case] canonical: &str) {
        let schema = SchemaRegistry::builtin().unwrap();
        assert_eq!(schema.canonical_key(alias), canonical);
    }

    #[test]
    fn defaults_cover_common_keys() {
        let schema = SchemaRegistry::builtin().unwrap();
        let defaults = schema.defaults();
        assert_eq!(defaults["channels"], Value::from(vec!["defaults"]));
        assert_eq!(defaults["ssl_verify"], Value::Bool(true));
        assert_eq!(defaults["channel_priority"], Value::from("flexible"));
        assert!(!defaults.contains_key("proxy_servers"));
        assert_eq!(
            defaults["aggressive_update_packages"],
            Value::from(vec!["ca-certificates", "certifi", "openssl"])
        );
        assert_eq!(defaults["verify_threads"], Value::Int(0));
        assert_eq!(defaults["execute_threads"], Value::Int(0));
        assert_eq!(defaults["anaconda_upload"], Value::Bool(false));
        assert_eq!(defaults["env_prompt"], Value::from("({default_env})"));
        assert_eq!(
            schema.default_for(&KeyPath::parse(r#"custom_channels."pkgs/pro""#)),
            Some(Value::from("https://repo.anaconda.com"))
        );
    }

    #[test]
    fn env_delimiters_follow_conda() {
        let schema = SchemaRegistry::builtin().unwrap();
        let delimiter = |key: &str| schema.lookup(&key.into()).unwrap().delimiter();
        assert_eq!(delimiter("channels"), ',');
        assert_eq!(delimiter("envs_dirs"), ':');
        assert_eq!(delimiter("pinned_packages"), '&');
    }

    #[test]
    fn channels_accept_names_and_mappings() {
        let schema = SchemaRegistry::builtin().unwrap();
        let (ty, _) = schema.type_for(&"channels".into()).unwrap();
        let entries: Value = serde_yaml::from_str(
            "- defaults\n- http://localhost:\n    type: local\n",
        )
        .unwrap();
        assert_eq!(ty.check(&entries), ValueCheck::Exact);
        assert_eq!(ty.check(&Value::from(vec![vec!["nested"]])), ValueCheck::Rejected);
    }

    #[test]
    fn multichannel_members_use_the_wildcard_entry() {
        let schema = SchemaRegistry::builtin().unwrap();
        let entry = schema.lookup(&"custom_multichannels.mine".into()).unwrap();
        assert_eq!(entry.strategy(), MergeStrategy::Append { set_like: true });
    }
}
