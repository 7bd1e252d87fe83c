//! storyrun CLI
//!
//! Command-line front end: discovers stories from the catalog configuration,
//! renders them in a WebDriver browser and reports the results.

pub mod commands;
pub mod output;
