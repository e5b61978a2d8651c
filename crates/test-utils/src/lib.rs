//! Shared test utilities for the SALT archive workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic exposure files for every instrument setup
//! - Filter curve generators
//! - Skip macros for tests that need a PostgreSQL database
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{require_database, FitsFixture};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Environment variable holding the PostgreSQL URL for database tests.
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// Macro to skip a test if no test database is configured.
///
/// # Usage
///
/// ```ignore
/// use test_utils::require_database;
///
/// #[tokio::test]
/// async fn test_create_is_idempotent() {
///     let url = require_database!();
///     // Test code connecting to url...
/// }
/// ```
///
/// If `TEST_DATABASE_URL` is unset, the test will print a skip message and return early.
#[macro_export]
macro_rules! require_database {
    () => {{
        match std::env::var($crate::TEST_DATABASE_URL) {
            Ok(url) if !url.is_empty() => url,
            _ => {
                eprintln!(
                    "SKIPPED: {} not set. Point it at a scratch PostgreSQL database to run this test.",
                    $crate::TEST_DATABASE_URL
                );
                return;
            }
        }
    }};
}

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}
