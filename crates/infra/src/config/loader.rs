//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Use the explicit path, or `HUBRELAY_CONFIG` when set
//! 2. Otherwise probe the standard locations; with no file, start from defaults
//! 3. Apply environment overrides
//! 4. Validate the result
//!
//! ## Environment Variables
//! - `HUBRELAY_CONFIG`: Config file path
//! - `HUBRELAY_HUB_URL`: Hub base URL
//! - `HUBRELAY_APP_TOKEN`: Application token sent on every hub request
//! - `HUBRELAY_DATABASE_PATH`: SQLite database file
//! - `HUBRELAY_DATABASE_POOL_SIZE`: Connection pool size
//! - `HUBRELAY_LOG_LEVEL`: Default log filter when `RUST_LOG` is unset
//! - `HUBRELAY_LOG_JSON`: Emit JSON logs (true/false)
//!
//! ## File Locations
//! The loader probes `./hubrelay.toml`, `./hubrelay.json`,
//! `./config/hubrelay.toml` and `./config/hubrelay.json`, in that order.
//! The format is chosen by file extension.

use std::path::{Path, PathBuf};

use hubrelay_domain::{BridgeConfig, HubRelayError, Result};

use crate::errors::InfraError;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "HUBRELAY_CONFIG";

const PROBED_FILES: [&str; 4] =
    ["hubrelay.toml", "hubrelay.json", "config/hubrelay.toml", "config/hubrelay.json"];

/// Load configuration from the process environment.
///
/// # Errors
/// Returns `HubRelayError::Config` if a named file is missing, a file cannot
/// be parsed, an override is malformed, or validation fails.
pub fn load(path: Option<PathBuf>) -> Result<BridgeConfig> {
    load_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment variables through `env`.
pub fn load_with_env<F>(path: Option<PathBuf>, env: F) -> Result<BridgeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let explicit = path.or_else(|| env(CONFIG_PATH_ENV).map(PathBuf::from));

    let mut config = match explicit.or_else(probe_config_paths) {
        Some(config_path) => load_from_file(&config_path)?,
        None => {
            tracing::info!("No config file found, starting from defaults");
            BridgeConfig::default()
        }
    };

    apply_env_overrides(&mut config, &env)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file without overrides or validation.
///
/// # Errors
/// Returns `HubRelayError::Config` if the file is missing, unreadable, or
/// not valid TOML/JSON.
pub fn load_from_file(path: &Path) -> Result<BridgeConfig> {
    if !path.exists() {
        return Err(HubRelayError::Config(format!("Config file not found: {}", path.display())));
    }

    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| HubRelayError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.toml` or `.json`).
fn parse_config(contents: &str, path: &Path) -> Result<BridgeConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| HubRelayError::from(InfraError::from(e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| HubRelayError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(HubRelayError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    PROBED_FILES.iter().map(|name| cwd.join(name)).find(|path| path.exists())
}

fn apply_env_overrides<F>(config: &mut BridgeConfig, env: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("HUBRELAY_HUB_URL") {
        config.hub.url = url;
    }
    if let Some(token) = env("HUBRELAY_APP_TOKEN") {
        config.hub.app_token = token;
    }
    if let Some(path) = env("HUBRELAY_DATABASE_PATH") {
        config.database.path = PathBuf::from(path);
    }
    if let Some(raw) = env("HUBRELAY_DATABASE_POOL_SIZE") {
        config.database.pool_size = raw.trim().parse().map_err(|e| {
            HubRelayError::Config(format!("Invalid HUBRELAY_DATABASE_POOL_SIZE '{raw}': {e}"))
        })?;
    }
    if let Some(level) = env("HUBRELAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(raw) = env("HUBRELAY_LOG_JSON") {
        config.logging.json = parse_bool(&raw).ok_or_else(|| {
            HubRelayError::Config(format!("Invalid HUBRELAY_LOG_JSON '{raw}'"))
        })?;
    }
    Ok(())
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use hubrelay_domain::IntegrationType;
    use tempfile::{Builder, NamedTempFile};

    use super::*;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_parse_bool_variants() {
        for raw in ["1", "true", "YES", " on "] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "False", "no", "off"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_load_toml_file_with_integrations() {
        let file = write_config(
            ".toml",
            r#"
[hub]
url = "https://hub.example.com"
app_token = "app"

[integrations.update_product_price]
queue_name = "product-price"
timer_period_ms = 5000
batch_limit = 50
"#,
        );

        let config = load_with_env(Some(file.path().to_path_buf()), env_of(&[])).unwrap();

        let settings = config.integrations.get(IntegrationType::UpdateProductPrice).unwrap();
        assert_eq!(settings.batch_limit, 50);
        assert_eq!(settings.timer_period_ms, 5000);
        assert!(config.integrations.get(IntegrationType::UpdateStock).is_none());
    }

    #[test]
    fn test_load_json_file() {
        let file = write_config(".json", r#"{ "hub": { "url": "https://hub.example.com" } }"#);

        let config = load_from_file(file.path()).unwrap();

        assert_eq!(config.hub.url, "https://hub.example.com");
        assert_eq!(config.queue.max_concurrent_messages, 8);
    }

    #[test]
    fn test_config_path_from_environment() {
        let file = write_config(".toml", "[hub]\nurl = \"https://from-env-path\"\n");
        let path = file.path().to_string_lossy().to_string();

        let config = load_with_env(None, env_of(&[(CONFIG_PATH_ENV, path.as_str())])).unwrap();

        assert_eq!(config.hub.url, "https://from-env-path");
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let file = write_config(".toml", "[hub]\nurl = \"https://file\"\n");

        let config = load_with_env(
            Some(file.path().to_path_buf()),
            env_of(&[
                ("HUBRELAY_HUB_URL", "https://env"),
                ("HUBRELAY_APP_TOKEN", "secret-app"),
                ("HUBRELAY_DATABASE_PATH", "/tmp/relay.db"),
                ("HUBRELAY_LOG_JSON", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.hub.url, "https://env");
        assert_eq!(config.hub.app_token, "secret-app");
        assert_eq!(config.database.path, PathBuf::from("/tmp/relay.db"));
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let file = write_config(".toml", "[hub]\nurl = \"https://file\"\n");

        let result = load_with_env(
            Some(file.path().to_path_buf()),
            env_of(&[("HUBRELAY_DATABASE_POOL_SIZE", "many")]),
        );

        assert!(matches!(result, Err(HubRelayError::Config(msg)) if msg.contains("POOL_SIZE")));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = load_with_env(Some(PathBuf::from("/nonexistent/hubrelay.toml")), env_of(&[]));

        assert!(matches!(result, Err(HubRelayError::Config(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_invalid_toml_and_unknown_extension() {
        let broken = write_config(".toml", "[hub");
        assert!(matches!(load_from_file(broken.path()), Err(HubRelayError::Config(_))));

        let yaml = write_config(".yaml", "hub: {}");
        let err = load_from_file(yaml.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported config format"));
    }

    #[test]
    fn test_validation_runs_after_overrides() {
        let file = write_config(".toml", "[hub]\nurl = \"https://file\"\n");

        let result =
            load_with_env(Some(file.path().to_path_buf()), env_of(&[("HUBRELAY_HUB_URL", " ")]));

        assert!(matches!(result, Err(HubRelayError::Config(msg)) if msg.contains("hub.url")));
    }
}
