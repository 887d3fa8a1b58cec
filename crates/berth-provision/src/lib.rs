//! Environment provisioning for the Berth service bootstrap.
//!
//! Executes a [`ProvisionPlan`](berth_recipe::ProvisionPlan) step by step:
//! establish the root, populate it, configure the environment, validate the
//! dependency manifests, run the installers, declare ports, and verify the
//! entrypoint. Every transition is journaled; every failure is final.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod entrypoint;
pub mod env;
pub mod installer;
pub mod journal;
pub mod logs;
pub mod manifest;
pub mod provisioner;
pub mod root;

pub use provisioner::{Provisioned, Provisioner};
