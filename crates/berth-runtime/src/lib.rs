//! Service lifecycle for the Berth runtime.
//!
//! Launches the provisioned entrypoint as a single foreground process,
//! tracks it until it exits, and records `Running` and `Exited` in the
//! journal.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod launch;
pub mod service;
