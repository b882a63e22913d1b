//! Utility functions and helpers.
//!
//! Environment variable handling shared by the configuration loaders.

pub mod env;

pub use env::{get_env_with_prefix, split_list};
