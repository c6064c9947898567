//! The resolution pipeline: locate, parse, merge, validate
//!
//! A source that cannot be read or parsed does not stop resolution: it is
//! recorded as a [`SourceFailure`], reported as an error diagnostic, and
//! every other source still merges.

use std::fmt;

use condarc_fs::NormalizedPath;
use serde::Serialize;
use tracing::{debug, warn};

use crate::env::EnvSource;
use crate::error::{Error, Result};
use crate::locator::{SearchContext, SourceLocator};
use crate::merge::{MergeEngine, MergedConfig};
use crate::schema::SchemaRegistry;
use crate::source::{Origin, SourceDocument};
use crate::validate::{Diagnostic, ValidationReport, Validator, codes};

/// A source that could not be read or parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub origin: Origin,
    pub message: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.message)
    }
}

/// Overall outcome of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    /// Every source loaded and no diagnostic is an error.
    Clean,
    /// Every source loaded, but validation found errors.
    Invalid,
    /// At least one source could not be read or parsed.
    Unreadable,
}

/// Result of resolving every source of a context
#[derive(Debug, Clone)]
pub struct Resolution {
    pub merged: MergedConfig,
    pub report: ValidationReport,
    pub failures: Vec<SourceFailure>,
    documents: Vec<SourceDocument>,
}

impl Resolution {
    pub fn status(&self) -> ResolutionStatus {
        if !self.failures.is_empty() {
            ResolutionStatus::Unreadable
        } else if self.report.has_errors() {
            ResolutionStatus::Invalid
        } else {
            ResolutionStatus::Clean
        }
    }

    /// Fail when any source was unreadable, naming every failing source.
    ///
    /// Validation errors do not fail: they stay in the report.
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::Unreadable {
                failures: self.failures,
            })
        }
    }

    /// Origins of the sources that loaded, lowest precedence first.
    pub fn sources(&self) -> impl Iterator<Item = &Origin> {
        self.documents.iter().map(|d| &d.origin)
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    /// The loaded document of a file, if it took part.
    pub fn document_for(&self, path: &NormalizedPath) -> Option<&SourceDocument> {
        let wanted = path.canonical();
        self.documents
            .iter()
            .find(|d| d.path().is_some_and(|p| p.canonical() == wanted))
    }
}

/// Drives locating, parsing, merging and validation
#[derive(Debug, Clone)]
pub struct ConfigResolver<'a> {
    schema: &'a SchemaRegistry,
    locator: SourceLocator,
    env: EnvSource,
}

impl<'a> ConfigResolver<'a> {
    /// Resolver over the files of `context`, without environment variables.
    pub fn new(schema: &'a SchemaRegistry, context: SearchContext) -> Self {
        Self {
            schema,
            locator: SourceLocator::new(context),
            env: EnvSource::empty(),
        }
    }

    /// Add `CONDA_*` variables as the highest-precedence layer.
    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    pub fn schema(&self) -> &'a SchemaRegistry {
        self.schema
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    /// Load every located source, collecting failures instead of stopping.
    pub fn load(&self, explicit: &[NormalizedPath]) -> (Vec<SourceDocument>, Vec<SourceFailure>) {
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for located in self.locator.locate(explicit) {
            match SourceDocument::load(located.scope, &located.path) {
                Ok(document) => {
                    debug!(path = %located.path, scope = %located.scope, "Loaded configuration source");
                    documents.push(document);
                }
                Err(e) => {
                    warn!(path = %located.path, error = %e, "Unable to load configuration source");
                    failures.push(SourceFailure {
                        origin: Origin::file(located.scope, located.path),
                        message: e.to_string(),
                    });
                }
            }
        }

        match self.env.to_document(self.schema) {
            Ok(Some(document)) => documents.push(document),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Unable to read configuration from environment variables");
                failures.push(SourceFailure {
                    origin: Origin::env_vars(),
                    message: e.to_string(),
                });
            }
        }

        (documents, failures)
    }

    /// Locate, load, merge and validate.
    ///
    /// `explicit` files rank above `$CONDARC`, in the given order.
    pub fn resolve(&self, explicit: &[NormalizedPath]) -> Resolution {
        let (documents, failures) = self.load(explicit);
        let merged = MergeEngine::new(self.schema).merge(&documents);
        let mut report = Validator::new(self.schema).validate(&merged);
        for failure in &failures {
            report.push(
                Diagnostic::error(
                    failure.origin.location.to_string(),
                    codes::UNREADABLE,
                    failure.message.clone(),
                )
                .with_source(failure.origin.to_string()),
            );
        }
        Resolution {
            merged,
            report,
            failures,
            documents,
        }
    }
}
