mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::AssistantError;
use crate::vault::VaultProvider;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve sensitive configuration values through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        use crate::vault::Secret;

        if let Some(val) = vault.get_secret("QUILL_GEMINI_API_KEY").await? {
            self.secrets.gemini_api_key = Some(Secret::new(val));
        }
        Ok(())
    }

    /// Reject settings no component could run with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the first offending setting.
    pub fn validate(&self) -> Result<(), AssistantError> {
        self.ocr.extractor_config().validate()?;
        self.index.index_config().validate()?;
        if !(0.0..=100.0).contains(&self.ocr.min_confidence) {
            return Err(AssistantError::InvalidConfiguration(format!(
                "ocr.min_confidence must be within 0..=100, got {}",
                self.ocr.min_confidence
            )));
        }
        if let Some(floor) = self.index.relevance_floor
            && !(-1.0..=1.0).contains(&floor)
        {
            return Err(AssistantError::InvalidConfiguration(format!(
                "index.relevance_floor must be within -1..=1, got {floor}"
            )));
        }
        assistant_settings(&self.assistant)
    }
}

pub(crate) fn assistant_settings(a: &AssistantConfig) -> Result<(), AssistantError> {
    let invalid = |msg: &str| Err(AssistantError::InvalidConfiguration(msg.to_owned()));
    if a.n_context_docs == 0 {
        return invalid("assistant.n_context_docs must be positive");
    }
    if a.max_tokens == 0 {
        return invalid("assistant.max_tokens must be positive");
    }
    if !a.temperature.is_finite() || a.temperature < 0.0 {
        return invalid("assistant.temperature must be a non-negative number");
    }
    if a.max_context_chars == 0 {
        return invalid("assistant.max_context_chars must be positive");
    }
    if a.generation_timeout_secs == 0 {
        return invalid("assistant.generation_timeout_secs must be positive");
    }
    Ok(())
}

/// Config file to load: the explicit flag, then `QUILL_CONFIG`, then the default path.
#[must_use]
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_owned();
    }
    if let Ok(path) = std::env::var("QUILL_CONFIG")
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}
