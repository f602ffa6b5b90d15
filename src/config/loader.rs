//! Configuration loader.
//!
//! Loads [`Settings`] from an optional TOML file with `FOREMAN__*`
//! environment variables layered on top (highest priority).

use std::path::Path;

use config::{Config, Environment, File, FileFormat};

use crate::config::error::ConfigError;
use crate::config::settings::Settings;

/// Environment variable prefix for configuration overrides
const ENV_PREFIX: &str = "FOREMAN";

/// Separator for nested configuration keys in environment variables
const ENV_SEPARATOR: &str = "__";

/// Load settings from the given TOML file (if any) and the environment.
///
/// # Errors
///
/// Returns an error if the file is missing, parsing fails, or the resulting
/// settings do not validate.
pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()));
        }
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;

    settings.validate()?;
    Ok(settings)
}
