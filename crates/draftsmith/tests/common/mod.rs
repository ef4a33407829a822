//! Shared test utilities for draftsmith integration tests.
//!
//! This module provides:
//! - `TestHarness` running a full engine over scripted providers
//! - Builders for configs and research bundles

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
