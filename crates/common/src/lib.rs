//! storyrun Common Library
//!
//! Shared data model, settings and error taxonomy used by the story
//! discovery pipeline and the browser render protocol.

pub mod config;
pub mod error;
pub mod types;

pub use config::Settings;
pub use error::{Error, ParseCause, ParseError, Result};
pub use types::*;

/// storyrun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default settings file name, looked up in the working directory
pub const SETTINGS_FILE: &str = "storyrun.toml";
