// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Configuration Overrides
//!
//! Applies CLI `--set path=value` overrides to a loaded [`ManagerConfig`].
//! Paths use dot notation over the serialized configuration:
//!
//! - `manager.listen=0.0.0.0:9000`
//! - `broadcast.target_mode=narrow`
//! - `transport.read_timeout_ms=5000`
//! - `scan.report_partial_results=true`

use super::{ConfigError, ConfigResult, ManagerConfig};
use serde_yaml::{Mapping, Value};

/// Apply `key=value` overrides in order; later overrides win
pub fn apply_config_overrides(
    config: &mut ManagerConfig,
    overrides: &[String],
) -> ConfigResult<()> {
    if overrides.is_empty() {
        return Ok(());
    }

    let mut value: Value = serde_yaml::to_value(&*config).map_err(|e| {
        ConfigError::internal_error(format!("Failed to serialize config for override: {}", e))
    })?;

    for override_str in overrides {
        let (path, val) = parse_override(override_str)?;
        log::debug!("Config override {} = {:?}", path.join("."), val);
        set_value_at_path(&mut value, &path, val)?;
    }

    *config = serde_yaml::from_value(value).map_err(|e| {
        ConfigError::validation_error(format!(
            "Configuration invalid after applying overrides: {}",
            e
        ))
    })?;

    Ok(())
}

fn parse_override(s: &str) -> ConfigResult<(Vec<String>, Value)> {
    let (path_str, value_str) = s.split_once('=').ok_or_else(|| {
        ConfigError::validation_error(format!(
            "Invalid override format '{}': expected 'key=value'",
            s
        ))
    })?;

    let path_str = path_str.trim();
    if path_str.is_empty() || path_str.split('.').any(|part| part.trim().is_empty()) {
        return Err(ConfigError::validation_error(format!(
            "Invalid override path in '{}'",
            s
        )));
    }

    let path = path_str.split('.').map(|p| p.trim().to_string()).collect();
    Ok((path, parse_value(value_str.trim())))
}

/// Infer a scalar type: bool, null, integer, float, then string
fn parse_value(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if s.eq_ignore_ascii_case("null") || s == "~" {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Number(f.into());
    }
    Value::String(s.to_string())
}

/// Set a value at a dot-notation path, creating intermediate mappings
fn set_value_at_path(root: &mut Value, path: &[String], value: Value) -> ConfigResult<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(ConfigError::internal_error(
            "Cannot set value at empty path".to_string(),
        ));
    };

    let mut current = root;
    for (i, key) in parents.iter().enumerate() {
        let map = match current {
            Value::Mapping(map) => map,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "Cannot navigate through non-mapping value at '{}'",
                    path[..i].join(".")
                )))
            }
        };
        let child = map
            .entry(Value::String(key.clone()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !child.is_mapping() {
            // an unset optional section serializes as null
            *child = Value::Mapping(Mapping::new());
        }
        current = child;
    }

    match current {
        Value::Mapping(map) => {
            map.insert(Value::String(last.clone()), value);
            Ok(())
        }
        _ => Err(ConfigError::validation_error(format!(
            "Cannot set '{}' on non-mapping value",
            path.join(".")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distributed::TargetMode;

    #[test]
    fn test_apply_overrides() {
        let mut config = ManagerConfig::default();
        let overrides = vec![
            "manager.listen=127.0.0.1:7000".to_string(),
            "broadcast.target_mode=narrow".to_string(),
            "broadcast.max_concurrency=4".to_string(),
            "scan.report_partial_results=true".to_string(),
            "catalog.path=/tmp/catalog.db".to_string(),
        ];
        apply_config_overrides(&mut config, &overrides).unwrap();

        assert_eq!(config.manager.listen, "127.0.0.1:7000");
        assert_eq!(config.broadcast.target_mode, TargetMode::Narrow);
        assert_eq!(config.broadcast.max_concurrency, 4);
        assert!(config.scan.report_partial_results);
        assert_eq!(config.catalog.path.as_deref(), Some("/tmp/catalog.db"));
    }

    #[test]
    fn test_later_override_wins() {
        let mut config = ManagerConfig::default();
        let overrides = vec![
            "transport.read_timeout_ms=100".to_string(),
            "transport.read_timeout_ms=200".to_string(),
        ];
        apply_config_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.transport.read_timeout_ms, 200);
    }

    #[test]
    fn test_invalid_overrides() {
        let mut config = ManagerConfig::default();
        assert!(apply_config_overrides(&mut config, &["no_equals".to_string()]).is_err());
        assert!(apply_config_overrides(&mut config, &["=value".to_string()]).is_err());
        assert!(apply_config_overrides(&mut config, &["a..b=1".to_string()]).is_err());
        // wrong type for a typed field
        assert!(
            apply_config_overrides(&mut config, &["broadcast.max_concurrency=lots".to_string()])
                .is_err()
        );
    }

    #[test]
    fn test_parse_value_types() {
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("42"), Value::Number(42.into()));
        assert!(parse_value("1.5").is_number());
        assert_eq!(parse_value("~"), Value::Null);
        assert_eq!(parse_value("narrow"), Value::String("narrow".to_string()));
    }
}
