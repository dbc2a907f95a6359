//! # IPMC Container
//!
//! Holds every subsystem instance and the configuration they were built
//! from.

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, HotswapSettings, IpmcConfig};
pub use subsystems::IpmcContainer;
