//! Configuration management module
//!
//! Layering: defaults, then `.env`, then environment variables, then CLI
//! flags, then validation.

pub mod env;
pub mod parser;

pub use env::EnvManager;
pub use parser::{display_config_summary, load_config, ConfigParser};

pub use crate::models::Config;
