use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Template written on first run. Credentials are tried in priority order:
/// api_key, then session_cookie (falling back to password), then password.
const TEMPLATE: &str = r#"[tracker]
username = ""
password = ""
session_cookie = ""
api_key = ""

[library]
content_dir = ""
output_dir = ""
torrent_dir = ""
spectral_dir = ""

[transcode]
formats = "flac, v0, 320"
media = "cd, dvd, vinyl, soundboard, sacd, dat, web, blu-ray"
allow_24bit = true
piece_length = 18
"#;

/// Loads configuration from a TOML file with environment overrides.
/// A missing file triggers the first-run bootstrap.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return bootstrap_config(path);
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        // Double underscore separates sections so snake_case keys like
        // GAPFILLER_TRACKER__RATE_LIMIT_MS survive intact.
        .merge(Env::prefixed("GAPFILLER_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;
    Ok(config)
}

/// Writes a blank config template and reports first-run so the caller can
/// exit with a distinguished status.
pub fn bootstrap_config(path: &Path) -> Result<Config, ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, TEMPLATE)?;
    Err(ConfigError::FirstRun(path.display().to_string()))
}

/// Loads configuration from a TOML string (useful for testing).
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config =
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
