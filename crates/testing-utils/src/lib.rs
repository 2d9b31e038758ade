//! # App Scheduler Testing Utils
//!
//! Shared testing utilities for the application job scheduler workspace.
//! This crate provides in-memory mock implementations of the storage and
//! host-integration traits, test data builders, and async test helpers.
//!
//! ## Usage
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! app-scheduler-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! Then use the mocks in your tests:
//!
//! ```rust
//! use app_scheduler_testing_utils::mocks::*;
//! use app_scheduler_testing_utils::builders::AppBuilder;
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
