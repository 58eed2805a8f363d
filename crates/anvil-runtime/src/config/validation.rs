//! Configuration validation.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{AnvilConfig, LogOutput, LoggingConfig};

/// Validates a loaded configuration.
pub fn validate_config(config: &AnvilConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_disabled_plugins(&config.disabled_plugins)?;
    validate_plugin_sections(config)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File {
        match &logging.file_path {
            None => return Err(ConfigError::missing_field("logging.file_path")),
            Some(path) if path.as_os_str().is_empty() => {
                return Err(ConfigError::validation(
                    "logging.file_path must not be empty when output is \"file\"",
                ));
            }
            Some(_) => {}
        }
    }

    if let Some(target) = logging.filters.keys().find(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "logging filter target must not be blank: {target:?}"
        )));
    }

    Ok(())
}

fn validate_disabled_plugins(names: &[String]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(ConfigError::validation(
                "disabled_plugins must not contain blank names",
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::validation(format!(
                "plugin listed twice in disabled_plugins: {name}"
            )));
        }
    }
    Ok(())
}

fn validate_plugin_sections(config: &AnvilConfig) -> ConfigResult<()> {
    match config.plugins.keys().find(|name| name.trim().is_empty()) {
        Some(_) => Err(ConfigError::validation(
            "plugin configuration sections must be named",
        )),
        None => Ok(()),
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AnvilConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = AnvilConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some(PathBuf::new());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));

        config.logging.file_path = Some(PathBuf::from("logs/anvil.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_disabled_plugins_must_be_unique_and_named() {
        let mut config = AnvilConfig {
            disabled_plugins: vec!["metrics".into(), "metrics".into()],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());

        config.disabled_plugins = vec![" ".into()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_blank_filter_target_rejected() {
        let mut config = AnvilConfig::default();
        config.logging.filters.insert("".into(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}
