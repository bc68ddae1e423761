use super::types::*;
use crate::config::{expand_env_vars, unexpanded_env_vars};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(inner) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), inner),
        )),
        other => other,
    })
}

/// Parses and validates a config document after `$env{}` expansion.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml = expand_env_vars(yaml);

    // Only parsed values count; references left in comments are ignored.
    let document: serde_yaml::Value = serde_yaml::from_str(&yaml)?;
    check_unexpanded_vars(&document)?;

    let config: Config = serde_yaml::from_value(document)?;
    validate_config(&config)?;

    Ok(config)
}

fn collect_unexpanded(value: &serde_yaml::Value, names: &mut Vec<String>) {
    match value {
        serde_yaml::Value::String(text) => names.extend(unexpanded_env_vars(text)),
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                collect_unexpanded(item, names);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (key, item) in map {
                collect_unexpanded(key, names);
                collect_unexpanded(item, names);
            }
        }
        serde_yaml::Value::Tagged(tagged) => collect_unexpanded(&tagged.value, names),
        _ => {}
    }
}

fn check_unexpanded_vars(document: &serde_yaml::Value) -> Result<(), ConfigError> {
    let mut names = Vec::new();
    collect_unexpanded(document, &mut names);
    names.sort();
    names.dedup();

    match names.as_slice() {
        [] => Ok(()),
        [single] => Err(ConfigError::Validation(format!(
            "environment variable $env{{{0}}} is not set.\n\
             Either export {0} or replace $env{{{0}}} in the config file with a literal value",
            single
        ))),
        many => Err(ConfigError::Validation(format!(
            "environment variables are not set: {}",
            many.join(", ")
        ))),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_api(&config.api, &mut errors);
    validate_fetch(&config.fetch, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_api(api: &ApiConfig, errors: &mut Vec<String>) {
    if api.base_url.is_empty() {
        errors.push("api.base_url cannot be empty".to_string());
    } else if !(api.base_url.starts_with("https://") || api.base_url.starts_with("http://")) {
        errors.push(format!(
            "api.base_url '{}' must start with http:// or https://",
            api.base_url
        ));
    }

    if api.account_id.trim().is_empty() {
        errors.push("api.account_id cannot be empty".to_string());
    }

    if let Some(proxy) = &api.proxy {
        if proxy.contains("://") {
            errors.push(format!(
                "api.proxy '{}' must be host:port without a scheme",
                proxy
            ));
        }
    }

    if api.max_retries == 0 {
        errors.push("api.max_retries must be at least 1".to_string());
    }

    if matches!(api.request_timeout, Some(t) if t.is_zero()) {
        errors.push("api.request_timeout must be greater than zero".to_string());
    }
}

fn validate_fetch(fetch: &FetchConfig, errors: &mut Vec<String>) {
    if fetch.page_size == 0 {
        errors.push("fetch.page_size must be at least 1".to_string());
    }

    if fetch.concurrency == 0 {
        errors.push("fetch.concurrency must be at least 1".to_string());
    } else if fetch.concurrency > MAX_CONCURRENCY {
        tracing::warn!(
            configured = fetch.concurrency,
            ceiling = MAX_CONCURRENCY,
            "fetch.concurrency above ceiling, it will be capped"
        );
    }

    if fetch.poll_interval < Duration::from_secs(1) {
        errors.push("fetch.poll_interval must be at least 1s".to_string());
    }

    if fetch.span_duration < Duration::from_secs(1) {
        errors.push("fetch.span_duration must be at least 1s".to_string());
    }
}
