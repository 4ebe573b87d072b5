//! Test infrastructure for the token search engine.
//!
//! Fixtures are plain `serde_json` resources plus helpers that build a
//! catalogue and an engine with a few extra token parameters.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;
