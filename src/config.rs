// src/config.rs

use crate::errors::{ParleyError, ParleyResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub db_path: String,
    pub username: String,
    pub model: String,
    pub chat_completion_source: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            db_path: "parley_cache.sqlite".to_string(),
            username: "User".to_string(),
            model: String::new(),
            chat_completion_source: String::new(),
            max_tokens: 1024,
            temperature: 0.7,
            stream: true,
            log_level: "info".to_string(),
        }
    }
}

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

pub fn initialize_config() -> ParleyResult<()> {
    let config_path = get_config_path()?;

    // If config exists, load it
    if config_path.exists() {
        let config_str = fs::read_to_string(&config_path)
            .map_err(|e| ParleyError::config_error(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_json::from_str(&config_str)
            .map_err(|e| ParleyError::config_error(format!("Failed to parse config: {}", e)))?;

        apply_env_overrides(&mut config);
        validate_config(&config)?;

        *CONFIG.write().unwrap() = config;
    } else {
        // Create default config
        let mut config = Config::default();
        apply_env_overrides(&mut config);

        fs::create_dir_all(config_path.parent().unwrap()).map_err(|e| {
            ParleyError::config_error(format!("Failed to create config directory: {}", e))
        })?;

        let config_str = serde_json::to_string_pretty(&config)
            .map_err(|e| ParleyError::config_error(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, config_str)
            .map_err(|e| ParleyError::config_error(format!("Failed to write config file: {}", e)))?;

        *CONFIG.write().unwrap() = config;
    }

    Ok(())
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = env::var("PARLEY_SERVER_URL") {
        config.base_url = url;
    }
    if let Ok(path) = env::var("PARLEY_DB_PATH") {
        config.db_path = path;
    }
}

fn get_config_path() -> ParleyResult<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| ParleyError::config_error("Could not determine home directory"))?;

    Ok(home_dir.join(".config").join("parley").join("config.json"))
}

fn validate_config(config: &Config) -> ParleyResult<()> {
    if config.base_url.is_empty() {
        return Err(ParleyError::config_error("Server URL is required"));
    }

    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(ParleyError::config_error(
            "Server URL must start with http:// or https://",
        ));
    }

    if config.temperature < 0.0 || config.temperature > 2.0 {
        return Err(ParleyError::config_error(
            "Temperature must be between 0.0 and 2.0",
        ));
    }

    if config.max_tokens == 0 {
        return Err(ParleyError::config_error(
            "max_tokens must be greater than 0",
        ));
    }

    Ok(())
}

pub fn get_config() -> Config {
    CONFIG.read().unwrap().clone()
}

pub fn update_config(updated_config: Config) -> ParleyResult<()> {
    validate_config(&updated_config)?;

    let config_path = get_config_path()?;
    let config_str = serde_json::to_string_pretty(&updated_config)
        .map_err(|e| ParleyError::config_error(format!("Failed to serialize config: {}", e)))?;

    fs::write(&config_path, config_str)
        .map_err(|e| ParleyError::config_error(format!("Failed to write config file: {}", e)))?;

    *CONFIG.write().unwrap() = updated_config;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_config_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_config_invalid_url() {
        let mut config = Config::default();
        config.base_url = "not-a-url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_invalid_temperature() {
        let mut config = Config::default();
        config.temperature = 3.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_config_zero_max_tokens() {
        let mut config = Config::default();
        config.max_tokens = 0;
        assert!(validate_config(&config).is_err());
    }
}
