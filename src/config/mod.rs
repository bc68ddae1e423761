pub mod generate;
pub mod parse;
pub mod types;

use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, ConfigError};
pub use types::{ApiConfig, Config, EventType, FetchConfig, MAX_CONCURRENCY};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/sia-events/config.yml";

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
    })
}

/// Replaces `$env{NAME}` with the value of `NAME`. Unset variables are left as written so
/// that config validation can report them.
pub fn expand_env_vars(text: &str) -> String {
    env_var_pattern()
        .replace_all(text, |caps: &Captures| match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

/// Names of `$env{NAME}` references still present in `text`, sorted and deduplicated.
pub fn unexpanded_env_vars(text: &str) -> Vec<String> {
    let mut names: Vec<String> = env_var_pattern()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    match (path_str.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        (None, Some(home)) if path_str == "~" => home,
        _ => path.to_path_buf(),
    }
}

/// Per-user config location, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/sia-events/config.yml"))
}

/// Resolves the config file to load. Returns the first match of:
/// 1. Explicit path (with tilde expansion), whether or not it exists
/// 2. ~/.config/sia-events/config.yml
/// 3. /etc/sia-events/config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        return Some(user_config);
    }

    let system_config = PathBuf::from(SYSTEM_CONFIG_PATH);
    system_config.exists().then_some(system_config)
}
