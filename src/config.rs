use crate::error::{MapperError, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub warehouse: WarehouseConfig,
    pub credentials: CredentialsConfig,
    pub boundaries: BoundariesConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct WarehouseConfig {
    pub base_url: String,
    pub database: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    /// Path to a file whose first line is the warehouse API key. The key
    /// itself never lives in config.toml.
    pub api_key_file: String,
}

#[derive(Debug, Deserialize)]
pub struct BoundariesConfig {
    pub url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    pub path: String,
    pub width: u32,
    pub height: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            MapperError::Config(format!("Failed to read config file '{}': {}", config_path, e))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Reads the API key from the configured credential file. The key is
    /// carried explicitly through the warehouse client rather than held in
    /// any process-wide global.
    pub fn read_api_key(&self) -> Result<String> {
        let raw = fs::read_to_string(&self.credentials.api_key_file).map_err(|e| {
            MapperError::Credential(format!(
                "Failed to read key file '{}': {}",
                self.credentials.api_key_file, e
            ))
        })?;
        let key = raw.lines().next().unwrap_or("").trim().to_string();
        if key.is_empty() {
            return Err(MapperError::Credential(format!(
                "Key file '{}' is empty",
                self.credentials.api_key_file
            )));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_first_line_of_key_file() {
        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(key_file, "sekrit-key-123").unwrap();
        writeln!(key_file, "trailing junk").unwrap();

        let config = Config {
            warehouse: WarehouseConfig {
                base_url: "http://localhost".into(),
                database: "TMC".into(),
                timeout_seconds: 30,
            },
            credentials: CredentialsConfig {
                api_key_file: key_file.path().to_string_lossy().into_owned(),
            },
            boundaries: BoundariesConfig {
                url: "http://localhost/counties.json".into(),
                timeout_seconds: 30,
            },
            output: OutputConfig {
                path: "responses.png".into(),
                width: 1000,
                height: 500,
            },
        };

        assert_eq!(config.read_api_key().unwrap(), "sekrit-key-123");
    }

    #[test]
    fn missing_key_file_is_a_credential_error() {
        let config = Config {
            warehouse: WarehouseConfig {
                base_url: "http://localhost".into(),
                database: "TMC".into(),
                timeout_seconds: 30,
            },
            credentials: CredentialsConfig {
                api_key_file: "/nonexistent/civis_key.txt".into(),
            },
            boundaries: BoundariesConfig {
                url: "http://localhost/counties.json".into(),
                timeout_seconds: 30,
            },
            output: OutputConfig {
                path: "responses.png".into(),
                width: 1000,
                height: 500,
            },
        };

        assert!(matches!(
            config.read_api_key(),
            Err(MapperError::Credential(_))
        ));
    }
}
