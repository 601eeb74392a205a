//! # Visitrack Testkit
//!
//! Test utilities for Visitrack.
//!
//! This crate provides:
//! - Record fixtures and a reference day
//! - Property-based test generators using proptest
//! - Wire vectors for push payload validation
//! - Scratch directories for file-based tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use visitrack_testkit::prelude::*;
//!
//! #[test]
//! fn window_holds_one_row() {
//!     let record = RecordBuilder::visitor("r-1").modified(at(9, 30)).build();
//!     // ... load it into a window
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
