//! Layered configuration resolution for conda's `.condarc` files
//!
//! Resolution runs leaf-first:
//!
//! 1. [`SourceLocator`] lists the candidate files of every scope
//! 2. each file is parsed into a [`condarc_content::ConfigDocument`]
//! 3. [`EnvSource`] adds `CONDA_*` variables as the top layer
//! 4. [`MergeEngine`] combines the layers per key using the [`SchemaRegistry`]
//! 5. [`Validator`] checks the merged result
//!
//! [`ConfigResolver`] drives the whole pipeline and [`ConfigStore`] wraps a
//! resolution with typed accessors and write-back.

pub mod env;
pub mod error;
pub mod locator;
pub mod merge;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod store;
pub mod validate;

pub use env::EnvSource;
pub use error::{Error, Result, SchemaError, WriteError};
pub use locator::{LocatedSource, SearchContext, SourceLocator};
pub use merge::{Contribution, MergeEngine, MergedConfig, MergedEntry};
pub use resolver::{ConfigResolver, Resolution, ResolutionStatus, SourceFailure};
pub use schema::{
    Constraint, MergeStrategy, SchemaEntry, SchemaRegistry, UnknownKeyPolicy, ValueCheck,
    ValueType,
};
pub use source::{Location, Origin, Scope, SourceDocument};
pub use store::{ConfigStore, InsertPosition, WriteTarget};
pub use validate::{Diagnostic, Severity, ValidationReport, Validator};

pub use condarc_content::{KeyPath, Value};
pub use condarc_fs::NormalizedPath;
