// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Configuration File Loading
//!
//! Reads the manager configuration from TOML (`.toml`) or YAML (`.yaml` /
//! `.yml`) and substitutes environment variables in every string value before
//! deserializing.
//!
//! ## Environment Variable Syntax
//!
//! - `${VAR_NAME}` - required, loading fails if it is unset
//! - `${VAR_NAME:default}` - optional, `default` is used when unset

use super::{ConfigError, ConfigResult, ManagerConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::env;
use std::path::Path;

static ENV_VAR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").unwrap());

/// Substitute environment variables in a string value
///
/// ```
/// use setmesh::core::config::substitute_env_vars;
///
/// let result = substitute_env_vars("${SETMESH_DOC_MISSING:fallback}").unwrap();
/// assert_eq!(result, "fallback");
/// ```
pub fn substitute_env_vars(value: &str) -> Result<String, String> {
    let mut result = value.to_string();
    let mut missing_vars = Vec::new();

    for cap in ENV_VAR_REGEX.captures_iter(value) {
        let var_name = &cap[1];
        let placeholder = &cap[0];
        match env::var(var_name) {
            Ok(env_value) => result = result.replace(placeholder, &env_value),
            Err(_) => match cap.get(2) {
                Some(default) => result = result.replace(placeholder, default.as_str()),
                None => missing_vars.push(var_name.to_string()),
            },
        }
    }

    if !missing_vars.is_empty() {
        return Err(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        ));
    }

    Ok(result)
}

/// Recursively substitute environment variables in TOML values
pub fn substitute_toml_env_vars(value: &mut toml::Value) -> Result<(), String> {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s)?;
        }
        toml::Value::Table(table) => {
            for (_, val) in table.iter_mut() {
                substitute_toml_env_vars(val)?;
            }
        }
        toml::Value::Array(arr) => {
            for val in arr.iter_mut() {
                substitute_toml_env_vars(val)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Recursively substitute environment variables in YAML values
pub fn substitute_yaml_env_vars(value: &mut serde_yaml::Value) -> Result<(), String> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = substitute_env_vars(s)?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, val) in map.iter_mut() {
                substitute_yaml_env_vars(val)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for val in seq.iter_mut() {
                substitute_yaml_env_vars(val)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse TOML text into a manager configuration
pub fn parse_toml_config(text: &str) -> ConfigResult<ManagerConfig> {
    let mut value: toml::Value = toml::from_str(text).map_err(|e| ConfigError::Parse {
        message: e.to_string(),
    })?;
    substitute_toml_env_vars(&mut value)
        .map_err(|message| ConfigError::EnvSubstitution { message })?;
    value.try_into().map_err(|e: toml::de::Error| ConfigError::Parse {
        message: e.to_string(),
    })
}

/// Parse YAML text into a manager configuration
pub fn parse_yaml_config(text: &str) -> ConfigResult<ManagerConfig> {
    let mut value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
    substitute_yaml_env_vars(&mut value)
        .map_err(|message| ConfigError::EnvSubstitution { message })?;
    serde_yaml::from_value(value).map_err(|e| ConfigError::Parse {
        message: e.to_string(),
    })
}

/// Load a configuration file, picking the format by extension (TOML unless
/// the file ends in `.yaml` or `.yml`)
pub fn load_config_file(path: impl AsRef<Path>) -> ConfigResult<ManagerConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let config = if is_yaml {
        parse_yaml_config(&text)?
    } else {
        parse_toml_config(&text)?
    };
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distributed::TargetMode;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_substitute_env_vars() {
        env::set_var("SETMESH_TEST_HOST", "storage-a");
        assert_eq!(
            substitute_env_vars("${SETMESH_TEST_HOST}:9000").unwrap(),
            "storage-a:9000"
        );
        assert_eq!(
            substitute_env_vars("${SETMESH_TEST_UNSET_VAR:fallback}").unwrap(),
            "fallback"
        );
        let err = substitute_env_vars("${SETMESH_TEST_UNSET_VAR}").unwrap_err();
        assert!(err.contains("SETMESH_TEST_UNSET_VAR"));
        env::remove_var("SETMESH_TEST_HOST");
    }

    #[test]
    #[serial]
    fn test_parse_toml_with_env() {
        env::set_var("SETMESH_TEST_CATALOG", "/var/lib/setmesh/catalog.db");
        let config = parse_toml_config(
            r#"
            [manager]
            listen = "127.0.0.1:9100"

            [catalog]
            path = "${SETMESH_TEST_CATALOG}"

            [broadcast]
            target_mode = "narrow"

            [[nodes]]
            address = "a:9000"

            [[nodes]]
            address = "b"
            name = "bee"
            "#,
        )
        .unwrap();
        env::remove_var("SETMESH_TEST_CATALOG");

        assert_eq!(config.manager.listen, "127.0.0.1:9100");
        assert_eq!(
            config.catalog.path.as_deref(),
            Some("/var/lib/setmesh/catalog.db")
        );
        assert_eq!(config.broadcast.target_mode, TargetMode::Narrow);
        assert_eq!(config.broadcast.max_concurrency, 64);
        assert_eq!(config.nodes.len(), 2);
    }

    #[test]
    fn test_parse_yaml() {
        let config = parse_yaml_config(
            "manager:\n  listen: \"127.0.0.1:9200\"\nscan:\n  report_partial_results: true\nnodes:\n  - address: \"a:1\"\n",
        )
        .unwrap();
        assert_eq!(config.manager.listen, "127.0.0.1:9200");
        assert!(config.scan.report_partial_results);
        assert_eq!(config.nodes[0].address, "a:1");
    }

    #[test]
    fn test_load_config_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("manager.toml");
        std::fs::write(&toml_path, "[transport]\nread_timeout_ms = 1000\n").unwrap();
        let yaml_path = dir.path().join("manager.yml");
        std::fs::write(&yaml_path, "transport:\n  read_timeout_ms: 2000\n").unwrap();

        assert_eq!(
            load_config_file(&toml_path).unwrap().transport.read_timeout_ms,
            1000
        );
        assert_eq!(
            load_config_file(&yaml_path).unwrap().transport.read_timeout_ms,
            2000
        );
        assert!(matches!(
            load_config_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(matches!(
            parse_toml_config("[manager\nlisten ="),
            Err(ConfigError::Parse { .. })
        ));
    }
}
