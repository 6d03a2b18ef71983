#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Foundational plumbing shared by the object server binaries: logging setup,
//! wall-clock helpers and configuration loading. Generalized from the
//! teacher's `flux` crate.

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use error::CoreError;
