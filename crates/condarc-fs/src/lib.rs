//! Filesystem helpers for the condarc engine
//!
//! Provides normalized path handling for provenance labels and the
//! write-to-temp-then-rename primitive used when persisting configuration.

pub mod error;
pub mod io;
pub mod path;

pub use error::{Error, Result};
pub use path::NormalizedPath;
