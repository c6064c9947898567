//! Schema registry: declared keys, their types, defaults and merge rules

pub mod builtin;
pub mod entry;
pub mod registry;

pub use entry::{Constraint, MergeStrategy, SchemaEntry, ValueCheck, ValueType, URL_SCHEMES, WILDCARD};
pub use registry::{SchemaRegistry, UnknownKeyPolicy};
