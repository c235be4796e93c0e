use crate::config::types::FlowConfig;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid trigger: {0}")]
    Trigger(String),
}

/// Load a pipeline config from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<FlowConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse a pipeline config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<FlowConfig, ConfigError> {
    let config: FlowConfig = serde_yaml::from_str(yaml)?;
    Ok(config)
}
