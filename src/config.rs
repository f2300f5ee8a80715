use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const CONFIG_ENV: &str = "ZP_CONFIG";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<u64>,
    pub attempts: Option<u32>,
    pub retry_delay: Option<u64>,
    pub output: Option<String>,
    pub batch_delay: Option<u64>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    profiles: Option<HashMap<String, ProfileConfig>>,
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, String> {
    let path = config_path()?;
    let profiles = read_profiles(&path)?;

    profiles.get(name).cloned().ok_or_else(|| {
        format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        )
    })
}

/// Parses the config file and checks every profile, or only `profile` when given.
pub fn validate_config(profile: Option<&str>) -> Result<PathBuf, String> {
    let path = config_path()?;
    let profiles = read_profiles(&path)?;

    let selected: Vec<(&String, &ProfileConfig)> = match profile {
        Some(name) => {
            let (key, config) = profiles.get_key_value(name).ok_or_else(|| {
                format!(
                    "Profile '{}' not found in config file '{}'.",
                    name,
                    path.display()
                )
            })?;
            vec![(key, config)]
        }
        None => profiles.iter().collect(),
    };

    for (name, config) in selected {
        validate_profile(config).map_err(|err| format!("Profile '{name}': {err}"))?;
    }
    Ok(path)
}

fn validate_profile(config: &ProfileConfig) -> Result<(), String> {
    if let Some(output) = &config.output {
        if output != "text" && output != "json" {
            return Err(format!(
                "invalid output '{output}'. Supported values: text, json."
            ));
        }
    }
    if config.attempts == Some(0) {
        return Err("attempts must be at least 1.".to_string());
    }
    if config.timeout == Some(0) {
        return Err("timeout must be at least 1 second.".to_string());
    }
    if config.concurrency == Some(0) {
        return Err("concurrency must be at least 1.".to_string());
    }
    if let Some(base_url) = &config.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(format!("base_url '{base_url}' must start with http:// or https://."));
        }
    }
    Ok(())
}

fn read_profiles(path: &Path) -> Result<HashMap<String, ProfileConfig>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;

    let config: ConfigFile = toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))?;

    config.profiles.ok_or_else(|| {
        format!(
            "Config file '{}' does not contain a [profiles] section.",
            path.display()
        )
    })
}

/// `ZP_CONFIG`, then `$XDG_CONFIG_HOME/zpipe/config.toml`, then
/// `$HOME/.config/zpipe/config.toml`. Blank variables are ignored.
pub fn config_path() -> Result<PathBuf, String> {
    resolve_config_path(|key| env::var(key).ok())
}

fn resolve_config_path(lookup: impl Fn(&str) -> Option<String>) -> Result<PathBuf, String> {
    let var = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(path) = var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let base = match (var("XDG_CONFIG_HOME"), var("HOME")) {
        (Some(xdg), _) => PathBuf::from(xdg),
        (None, Some(home)) => PathBuf::from(home).join(".config"),
        (None, None) => {
            return Err(format!(
                "Cannot resolve config path: set {CONFIG_ENV}, XDG_CONFIG_HOME or HOME."
            ));
        }
    };
    Ok(base.join("zpipe").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ConfigFile {
        toml::from_str(raw).expect("config should parse")
    }

    #[test]
    fn profile_keys_deserialize() {
        let config = parse(
            "[profiles.work]\nmodel = \"glm-4\"\nattempts = 5\nretry_delay = 250\noutput = \"json\"\nconcurrency = 4\n",
        );
        let profile = &config.profiles.expect("profiles section")["work"];
        assert_eq!(profile.model.as_deref(), Some("glm-4"));
        assert_eq!(profile.attempts, Some(5));
        assert_eq!(profile.retry_delay, Some(250));
        assert_eq!(profile.concurrency, Some(4));
    }

    #[test]
    fn unknown_profile_keys_are_rejected() {
        let parsed: Result<ConfigFile, _> = toml::from_str("[profiles.x]\nprovider = \"openai\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let bad_output = ProfileConfig {
            output: Some("yaml".to_string()),
            ..ProfileConfig::default()
        };
        assert!(validate_profile(&bad_output).is_err());

        let zero_attempts = ProfileConfig {
            attempts: Some(0),
            ..ProfileConfig::default()
        };
        assert!(validate_profile(&zero_attempts).is_err());

        assert!(validate_profile(&ProfileConfig::default()).is_ok());
    }

    #[test]
    fn config_path_lookup_order() {
        let vars = |pairs: &'static [(&'static str, &'static str)]| {
            move |key: &str| {
                pairs
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| value.to_string())
            }
        };

        let explicit = resolve_config_path(vars(&[
            ("ZP_CONFIG", "/etc/zpipe.toml"),
            ("XDG_CONFIG_HOME", "/xdg"),
        ]));
        assert_eq!(explicit, Ok(PathBuf::from("/etc/zpipe.toml")));

        let xdg = resolve_config_path(vars(&[
            ("ZP_CONFIG", "  "),
            ("XDG_CONFIG_HOME", "/xdg"),
            ("HOME", "/home/u"),
        ]));
        assert_eq!(xdg, Ok(PathBuf::from("/xdg/zpipe/config.toml")));

        let home = resolve_config_path(vars(&[("HOME", "/home/u")]));
        assert_eq!(home, Ok(PathBuf::from("/home/u/.config/zpipe/config.toml")));

        let err = resolve_config_path(vars(&[])).expect_err("nothing to resolve from");
        assert!(err.contains("ZP_CONFIG"));
    }
}
