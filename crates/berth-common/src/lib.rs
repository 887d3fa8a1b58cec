//! # berth-common
//!
//! Shared types, error definitions, configuration models, and the default
//! values of the provisioning contract used across the Berth workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
