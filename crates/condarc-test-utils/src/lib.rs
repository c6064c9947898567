//! Shared test utilities for the condarc engine workspace.
//!
//! Dev-dependency only. Fixtures here never touch the real home directory
//! or process environment.
//!
//! # Modules
//!
//! - [`layout`]: [`TestLayout`] temporary search-path tree

pub mod layout;

pub use layout::TestLayout;
