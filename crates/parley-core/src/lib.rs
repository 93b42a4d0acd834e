//! Parley core crate - shared error type, configuration, and domain types.
//!
//! Every other Parley crate depends on this one. It deliberately contains
//! no I/O beyond config file loading.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ParleyError, Result};
