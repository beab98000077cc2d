//! CLI command implementations.

pub mod config;
pub mod decide;
pub mod parse_url;
pub mod session;

use std::path::Path;

use abrshim::config::ConfigFile;

use crate::error::CliError;

/// Load configuration from `path`, or from the per-user file.
///
/// An unreadable per-user file falls back to defaults; an explicitly named
/// file must parse.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => Ok(ConfigFile::load_from(path)?),
        None => Ok(ConfigFile::load().unwrap_or_default()),
    }
}
