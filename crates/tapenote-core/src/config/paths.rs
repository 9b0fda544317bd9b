//! Standard locations for tapenote configuration

use std::path::PathBuf;

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Get the default configuration directory
///
/// Returns: `<platform config dir>/tapenote` (e.g. `~/.config/tapenote`),
/// or `./tapenote` when the platform has no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tapenote")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_app_name() {
        assert!(default_config_dir().ends_with("tapenote"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        assert!(default_config_path().ends_with(CONFIG_FILE_NAME));
    }
}
