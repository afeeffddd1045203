//! Cross-module scenario tests.
//!
//! - `determinism.rs`: same seed, same battle; wake-order fairness
//! - `integration.rs`: full battles through the driver
//! - `helpers.rs`: robot factories, configs and test observers

mod helpers;
mod integration;

pub use helpers::*;
