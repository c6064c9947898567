//! Inputs of the file search: home, installation root, active prefix

use condarc_fs::NormalizedPath;

#[cfg(windows)]
const SYSTEM_DIRS: &[&str] = &["C:/ProgramData/conda"];
#[cfg(not(windows))]
const SYSTEM_DIRS: &[&str] = &["/etc/conda", "/var/lib/conda"];

/// Where configuration files are searched for
///
/// Built from the process environment with [`SearchContext::from_env`], or
/// from an explicit variable list with [`SearchContext::from_vars`] so tests
/// never touch the real environment. Empty variables count as unset, and a
/// leading `~` expands to [`SearchContext::home`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchContext {
    home: Option<NormalizedPath>,
    system_dirs: Vec<NormalizedPath>,
    conda_root: Option<NormalizedPath>,
    xdg_config_home: Option<NormalizedPath>,
    conda_prefix: Option<NormalizedPath>,
    condarc: Option<NormalizedPath>,
}

impl SearchContext {
    /// Context from the process environment, with the home directory
    /// reported by the platform.
    pub fn from_env() -> Self {
        let mut context = Self::from_vars(std::env::vars());
        if let Some(home) = dirs::home_dir() {
            context.home = Some(NormalizedPath::new(home));
        }
        context
    }

    /// Context from an explicit set of variables.
    ///
    /// Reads `HOME` (or `USERPROFILE`), `CONDA_ROOT`, `XDG_CONFIG_HOME`,
    /// `CONDA_PREFIX` and `CONDARC`. System directories take their
    /// platform defaults.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut context = Self {
            system_dirs: SYSTEM_DIRS.iter().map(|d| NormalizedPath::new(d)).collect(),
            ..Self::default()
        };
        let mut profile = None;
        let mut raw = Vec::new();
        for (key, value) in vars {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "HOME" => context.home = Some(NormalizedPath::new(value)),
                "USERPROFILE" => profile = Some(NormalizedPath::new(value)),
                name @ ("CONDA_ROOT" | "XDG_CONFIG_HOME" | "CONDA_PREFIX" | "CONDARC") => {
                    raw.push((name.to_string(), value.to_string()));
                }
                _ => {}
            }
        }
        if context.home.is_none() {
            context.home = profile;
        }
        for (name, value) in raw {
            let path = Some(context.expand(&value));
            match name.as_str() {
                "CONDA_ROOT" => context.conda_root = path,
                "XDG_CONFIG_HOME" => context.xdg_config_home = path,
                "CONDA_PREFIX" => context.conda_prefix = path,
                _ => context.condarc = path,
            }
        }
        context
    }

    /// A context with no search locations at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_home(mut self, home: impl Into<NormalizedPath>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_system_dirs<P: Into<NormalizedPath>>(
        mut self,
        dirs: impl IntoIterator<Item = P>,
    ) -> Self {
        self.system_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_conda_root(mut self, root: impl Into<NormalizedPath>) -> Self {
        self.conda_root = Some(root.into());
        self
    }

    pub fn with_xdg_config_home(mut self, dir: impl Into<NormalizedPath>) -> Self {
        self.xdg_config_home = Some(dir.into());
        self
    }

    pub fn with_conda_prefix(mut self, prefix: impl Into<NormalizedPath>) -> Self {
        self.conda_prefix = Some(prefix.into());
        self
    }

    /// Set the `$CONDARC` override file.
    pub fn with_condarc(mut self, path: impl Into<NormalizedPath>) -> Self {
        self.condarc = Some(path.into());
        self
    }

    pub fn home(&self) -> Option<&NormalizedPath> {
        self.home.as_ref()
    }

    pub fn system_dirs(&self) -> &[NormalizedPath] {
        &self.system_dirs
    }

    pub fn conda_root(&self) -> Option<&NormalizedPath> {
        self.conda_root.as_ref()
    }

    pub fn xdg_config_home(&self) -> Option<&NormalizedPath> {
        self.xdg_config_home.as_ref()
    }

    pub fn conda_prefix(&self) -> Option<&NormalizedPath> {
        self.conda_prefix.as_ref()
    }

    pub fn condarc(&self) -> Option<&NormalizedPath> {
        self.condarc.as_ref()
    }

    /// Expand a leading `~` against this context's home directory.
    pub fn expand(&self, path: &str) -> NormalizedPath {
        match (path.strip_prefix('~'), &self.home) {
            (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
                home.join(rest.trim_start_matches(['/', '\\']))
            }
            _ => NormalizedPath::new(path),
        }
    }
}
