//! Where a configuration layer comes from

use std::fmt;

use condarc_content::{ConfigDocument, Format, ParseError};
use condarc_fs::NormalizedPath;
use serde::{Serialize, Serializer};

use crate::Result;

/// Precedence tier of a source, lowest first
///
/// The derived ordering follows precedence: `System < User < Environment <
/// Override < EnvVars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Machine-wide files and the conda installation root
    System,
    /// Files in the user's home and config directories
    User,
    /// Files of the active conda prefix
    Environment,
    /// `$CONDARC` and explicitly supplied files
    Override,
    /// `CONDA_*` environment variables
    EnvVars,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Environment => "environment",
            Self::Override => "override",
            Self::EnvVars => "env_vars",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical location of a source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    File(NormalizedPath),
    /// The process environment (or an explicit variable map standing in for it)
    Environment,
}

impl Location {
    pub fn path(&self) -> Option<&NormalizedPath> {
        match self {
            Self::File(path) => Some(path),
            Self::Environment => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{path}"),
            Self::Environment => f.write_str("envvars"),
        }
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Scope plus location: the label attached to every contributed value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Origin {
    pub scope: Scope,
    pub location: Location,
}

impl Origin {
    pub fn file(scope: Scope, path: impl Into<NormalizedPath>) -> Self {
        Self {
            scope,
            location: Location::File(path.into()),
        }
    }

    pub fn env_vars() -> Self {
        Self {
            scope: Scope::EnvVars,
            location: Location::Environment,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.scope)
    }
}

/// A parsed document tagged with its origin
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub origin: Origin,
    pub document: ConfigDocument,
}

impl SourceDocument {
    pub fn new(origin: Origin, document: ConfigDocument) -> Self {
        Self { origin, document }
    }

    /// Read and parse a configuration file.
    pub fn load(scope: Scope, path: &NormalizedPath) -> Result<Self> {
        let text = condarc_fs::io::read_text(path)?;
        let document = parse_file(path, &text)
            .map_err(condarc_content::Error::from)?
            .with_origin(path.to_native());
        Ok(Self::new(Origin::file(scope, path.clone()), document))
    }

    pub fn scope(&self) -> Scope {
        self.origin.scope
    }

    pub fn path(&self) -> Option<&NormalizedPath> {
        self.origin.location.path()
    }
}

/// Parse file text, honoring a `.json`/`.yml`/`.yaml` extension.
///
/// Files without a known extension (`.condarc`) are sniffed.
pub(crate) fn parse_file(
    path: &NormalizedPath,
    text: &str,
) -> std::result::Result<ConfigDocument, ParseError> {
    match path.extension().and_then(Format::from_extension) {
        Some(format) => ConfigDocument::parse_as(text, format),
        None => ConfigDocument::parse(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_order_by_precedence() {
        assert!(Scope::System < Scope::User);
        assert!(Scope::Override < Scope::EnvVars);
        assert_eq!(Scope::EnvVars.to_string(), "env_vars");
    }

    #[test]
    fn load_reads_and_tags_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = NormalizedPath::new(dir.path().join("extra.json"));
        std::fs::write(path.to_native(), r#"{"channels": ["a"]}"#).unwrap();

        let source = SourceDocument::load(Scope::Override, &path).unwrap();
        assert_eq!(source.document.format(), Format::Json);
        assert_eq!(source.path(), Some(&path));
        assert_eq!(source.scope(), Scope::Override);
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = NormalizedPath::new(dir.path().join(".condarc"));
        std::fs::write(path.to_native(), "a: 1\na: 2\n").unwrap();

        let err = SourceDocument::load(Scope::User, &path).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn origins_render_location_and_scope() {
        let origin = Origin::file(Scope::User, "/home/me/.condarc");
        assert_eq!(origin.to_string(), "/home/me/.condarc (user)");
        assert_eq!(Origin::env_vars().to_string(), "envvars (env_vars)");
        assert_eq!(
            serde_json::to_value(&origin).unwrap(),
            serde_json::json!({"scope": "user", "location": "/home/me/.condarc"})
        );
    }
}
