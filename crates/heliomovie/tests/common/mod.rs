//! Shared test utilities for heliomovie integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with temp image and output directories
//! - Stub encoders that stand in for ffmpeg
//! - Builders for configurations and movie requests

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FailingEncoder, TestHarness, TouchEncoder};
