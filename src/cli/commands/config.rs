use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::cli::ConfigCommands;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigShowOutput {
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config).unwrap_or_else(|e| format!("<unprintable config: {e}>"))
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub storage: String,
    pub global_max_retry: Option<u32>,
    pub heartbeat_interval_secs: Option<u64>,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        let retry = self
            .global_max_retry
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string());
        let heartbeat = self
            .heartbeat_interval_secs
            .map_or_else(|| "disabled".to_string(), |s| format!("{s}s"));
        format!(
            "Configuration is valid.\n  Storage: {}\n  Global max retry: {retry}\n  Heartbeat: {heartbeat}",
            self.storage
        )
    }
}

pub fn execute(command: ConfigCommands, config: Config, json: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => output(&ConfigShowOutput { config }, json),
        ConfigCommands::Validate => {
            // Loading already validated; re-check so a programmatic Config gets the same treatment
            ConfigLoader::validate(&config).context("Configuration is invalid")?;
            let storage = serde_json::to_value(config.storage)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            output(
                &ConfigValidateOutput {
                    valid: true,
                    storage,
                    global_max_retry: config.retry.global_max_retry,
                    heartbeat_interval_secs: config
                        .executor
                        .heartbeat_enabled
                        .then_some(config.executor.heartbeat_interval_secs),
                },
                json,
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_is_yaml() {
        let human = ConfigShowOutput {
            config: Config::default(),
        }
        .to_human();
        assert!(human.contains("executor:"));
        assert!(human.contains("heartbeat_interval_secs"));
    }

    #[test]
    fn test_validate_output_unbounded() {
        let out = ConfigValidateOutput {
            valid: true,
            storage: "memory".into(),
            global_max_retry: None,
            heartbeat_interval_secs: None,
        };
        let human = out.to_human();
        assert!(human.contains("Global max retry: unbounded"));
        assert!(human.contains("Heartbeat: disabled"));
    }
}
