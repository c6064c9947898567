//! Document model for condarc configuration files
//!
//! Parses YAML (and JSON) configuration sources into a [`ConfigDocument`]
//! that keeps the original text next to the decoded values, so single keys
//! can be rewritten without disturbing comments or unrelated keys.

pub mod document;
pub mod error;
pub mod format;
pub mod path;
pub mod render;
pub mod scan;
pub mod value;

pub use document::ConfigDocument;
pub use error::{Error, ParseError, Result};
pub use format::Format;
pub use path::KeyPath;
pub use scan::{Annotation, AnnotationKind, Node, NodeKind};
pub use value::Value;
