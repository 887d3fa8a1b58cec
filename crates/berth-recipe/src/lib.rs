//! # berth-recipe
//!
//! Parser and resolver for Berth recipes, the Containerfile-style build
//! definitions that describe how a service is provisioned.
//!
//! Handles:
//! - **Parser**: Lexing, AST construction, and validation of recipe files.
//! - **Plan**: Lowering a validated recipe into the ordered provisioning plan.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod parser;
pub mod plan;

pub use parser::ast::{CommandSpec, Instruction, Recipe};
pub use parser::parse_recipe;
pub use plan::{CopySpec, ProvisionPlan};
