//! Test support utilities for the table-creation workspace.
//!
//! This crate provides shared testing infrastructure:
//! - Row and descriptor fixtures for catalog-level tests
//! - A pre-seeded catalog store with committed reference tables
//! - Property-based test generators for descriptors and values
//!
//! # Example Usage
//!
//! ```
//! use testsupport::prelude::*;
//!
//! let store = seeded_store();
//! assert!(store.lookup_table(
//!     catalog::DEFAULT_DATABASE_ID,
//!     catalog::PUBLIC_SCHEMA_ID,
//!     "customers",
//! ).is_some());
//! ```

pub mod fixtures;
pub mod proptest_generators;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::proptest_generators::*;
}
