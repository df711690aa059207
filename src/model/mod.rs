//! Core data types for packages, advisory records, and scan output.
//!
//! This module contains the fundamental types used throughout sockscan:
//!
//! - [`Package`] - A dependency instance to check
//! - [`RawArtifact`] - The advisory service's per-package result record
//! - [`Alert`] - A single finding attached to an artifact
//! - [`Advisory`] - The final, user-facing warning derived from one alert
//!
//! # Example
//!
//! ```
//! use sockscan::model::Package;
//!
//! let package = Package::new("lodash", "4.17.21");
//! assert_eq!(package.purl(), "pkg:npm/lodash@4.17.21");
//! ```

mod advisory;
mod package;

pub use advisory::*;
pub use package::*;
