//! Discovery of configuration files across scopes
//!
//! The search order, lowest precedence first:
//!
//! 1. **System**: every system directory, then `$CONDA_ROOT`
//! 2. **User**: `$XDG_CONFIG_HOME/conda`, `~/.config/conda`, `~/.conda`,
//!    then `~/.condarc`
//! 3. **Environment**: `$CONDA_PREFIX`
//! 4. **Override**: `$CONDARC`, then explicitly supplied paths
//!
//! Each directory contributes `.condarc`, `condarc` and the YAML files of
//! `condarc.d/`.

pub mod context;

pub use context::SearchContext;

use std::collections::HashSet;
use std::fs;

use condarc_fs::NormalizedPath;
use serde::Serialize;
use tracing::debug;

use crate::source::Scope;

/// File names probed in every search directory.
pub const RC_NAMES: [&str; 3] = [".condarc", "condarc", "condarc.d"];

/// Extensions loaded from a `condarc.d` directory.
pub const FRAGMENT_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// A configuration file found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedSource {
    pub scope: Scope,
    pub path: NormalizedPath,
}

/// Finds the configuration files of a [`SearchContext`]
#[derive(Debug, Clone)]
pub struct SourceLocator {
    context: SearchContext,
}

impl SourceLocator {
    pub fn new(context: SearchContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    /// Every path probed, in precedence order, whether or not it exists.
    pub fn candidates(&self, explicit: &[NormalizedPath]) -> Vec<(Scope, NormalizedPath)> {
        let ctx = &self.context;
        let mut out = Vec::new();

        for dir in ctx.system_dirs().iter().chain(ctx.conda_root()) {
            probe(&mut out, Scope::System, dir);
        }

        if let Some(xdg) = ctx.xdg_config_home() {
            probe(&mut out, Scope::User, &xdg.join("conda"));
        }
        if let Some(home) = ctx.home() {
            probe(&mut out, Scope::User, &home.join(".config/conda"));
            probe(&mut out, Scope::User, &home.join(".conda"));
            out.push((Scope::User, home.join(".condarc")));
        }

        if let Some(prefix) = ctx.conda_prefix() {
            probe(&mut out, Scope::Environment, prefix);
        }

        out.extend(ctx.condarc().cloned().map(|path| (Scope::Override, path)));
        out.extend(explicit.iter().cloned().map(|path| (Scope::Override, path)));
        out
    }

    /// Existing configuration files, lowest precedence first.
    ///
    /// Directories expand to their `*.yml`/`*.yaml` files sorted by name.
    /// A file reached through several candidates keeps only its last,
    /// highest-precedence position.
    pub fn locate(&self, explicit: &[NormalizedPath]) -> Vec<LocatedSource> {
        let mut found = Vec::new();
        for (scope, path) in self.candidates(explicit) {
            if path.is_file() {
                found.push(LocatedSource { scope, path });
            } else if path.is_dir() {
                found.extend(
                    fragments(&path)
                        .into_iter()
                        .map(|path| LocatedSource { scope, path }),
                );
            } else {
                debug!(path = %path, %scope, "Skipping missing search path");
            }
        }
        dedupe_keep_last(found)
    }

    /// The file a scope writes to.
    ///
    /// `None` when the scope has no file in this context, as for
    /// [`Scope::EnvVars`] or an unset `$CONDARC`.
    pub fn write_path(&self, scope: Scope) -> Option<NormalizedPath> {
        let ctx = &self.context;
        match scope {
            Scope::System => ctx
                .conda_root()
                .or_else(|| ctx.system_dirs().first())
                .map(|dir| dir.join(".condarc")),
            Scope::User => ctx.home().map(|home| home.join(".condarc")),
            Scope::Environment => ctx.conda_prefix().map(|prefix| prefix.join(".condarc")),
            Scope::Override => ctx.condarc().cloned(),
            Scope::EnvVars => None,
        }
    }
}

fn probe(out: &mut Vec<(Scope, NormalizedPath)>, scope: Scope, dir: &NormalizedPath) {
    for name in RC_NAMES {
        out.push((scope, dir.join(name)));
    }
}

/// YAML files directly inside a `condarc.d` directory, sorted by file name.
fn fragments(dir: &NormalizedPath) -> Vec<NormalizedPath> {
    let entries = match fs::read_dir(dir.to_native()) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %dir, error = %e, "Skipping unreadable directory");
            return Vec::new();
        }
    };
    let mut files: Vec<NormalizedPath> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| NormalizedPath::new(entry.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| FRAGMENT_EXTENSIONS.contains(&ext))
                && path.is_file()
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

fn dedupe_keep_last(found: Vec<LocatedSource>) -> Vec<LocatedSource> {
    let mut seen = HashSet::new();
    let mut kept: Vec<LocatedSource> = found
        .into_iter()
        .rev()
        .filter(|source| seen.insert(source.path.canonical()))
        .collect();
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, rel: &str) -> NormalizedPath {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{}\n").unwrap();
        NormalizedPath::new(path)
    }

    fn context(dir: &TempDir) -> SearchContext {
        let root = NormalizedPath::new(dir.path());
        SearchContext::empty()
            .with_home(root.join("home"))
            .with_system_dirs([root.join("etc")])
    }

    #[test]
    fn candidates_follow_precedence_order() {
        let locator = SourceLocator::new(
            SearchContext::empty()
                .with_home("/h")
                .with_system_dirs(["/etc/conda"])
                .with_conda_root("/opt/conda")
                .with_xdg_config_home("/xdg")
                .with_conda_prefix("/env")
                .with_condarc("/rc.yml"),
        );
        let paths: Vec<String> = locator
            .candidates(&[NormalizedPath::new("/cli.yml")])
            .into_iter()
            .map(|(scope, path)| format!("{scope}:{path}"))
            .collect();
        assert_eq!(
            paths,
            vec![
                "system:/etc/conda/.condarc",
                "system:/etc/conda/condarc",
                "system:/etc/conda/condarc.d",
                "system:/opt/conda/.condarc",
                "system:/opt/conda/condarc",
                "system:/opt/conda/condarc.d",
                "user:/xdg/conda/.condarc",
                "user:/xdg/conda/condarc",
                "user:/xdg/conda/condarc.d",
                "user:/h/.config/conda/.condarc",
                "user:/h/.config/conda/condarc",
                "user:/h/.config/conda/condarc.d",
                "user:/h/.conda/.condarc",
                "user:/h/.conda/condarc",
                "user:/h/.conda/condarc.d",
                "user:/h/.condarc",
                "environment:/env/.condarc",
                "environment:/env/condarc",
                "environment:/env/condarc.d",
                "override:/rc.yml",
                "override:/cli.yml",
            ]
        );
    }

    #[test]
    fn locate_skips_missing_files() {
        let dir = TempDir::new().unwrap();
        let user = touch(&dir, "home/.condarc");
        let locator = SourceLocator::new(context(&dir));

        let found = locator.locate(&[]);
        assert_eq!(
            found,
            vec![LocatedSource {
                scope: Scope::User,
                path: user
            }]
        );
    }

    #[test]
    fn nothing_found_is_empty() {
        let dir = TempDir::new().unwrap();
        let locator = SourceLocator::new(context(&dir));
        assert!(locator.locate(&[]).is_empty());
    }

    #[test]
    fn fragment_directories_load_sorted_yaml_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "etc/condarc.d/20-b.yaml");
        touch(&dir, "etc/condarc.d/10-a.yml");
        touch(&dir, "etc/condarc.d/notes.txt");
        let locator = SourceLocator::new(context(&dir));

        let names: Vec<String> = locator
            .locate(&[])
            .iter()
            .filter_map(|s| s.path.file_name().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["10-a.yml", "20-b.yaml"]);
    }

    #[test]
    fn repeated_file_keeps_its_last_position() {
        let dir = TempDir::new().unwrap();
        let user = touch(&dir, "home/.condarc");
        let locator = SourceLocator::new(context(&dir).with_condarc(user.clone()));

        let found = locator.locate(&[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].scope, Scope::Override);
    }

    #[test]
    fn write_paths_per_scope() {
        let locator = SourceLocator::new(
            SearchContext::empty()
                .with_home("/h")
                .with_system_dirs(["/etc/conda"])
                .with_conda_prefix("/env"),
        );
        assert_eq!(
            locator.write_path(Scope::System).unwrap().as_str(),
            "/etc/conda/.condarc"
        );
        assert_eq!(locator.write_path(Scope::User).unwrap().as_str(), "/h/.condarc");
        assert_eq!(
            locator.write_path(Scope::Environment).unwrap().as_str(),
            "/env/.condarc"
        );
        assert!(locator.write_path(Scope::Override).is_none());
        assert!(locator.write_path(Scope::EnvVars).is_none());
    }
}
