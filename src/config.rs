use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

/// Persisted user preferences. Both keys are written together on every save;
/// missing keys fall back to defaults at session construction.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub selected_model: Option<String>,
    pub system_prompt: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Update the persisted model choice, keeping the stored prompt intact.
    pub fn save_selected_model(path: &Path, model: &str) -> Result<()> {
        let mut config = Self::load_from(path).unwrap_or_else(|_| Self::new());
        config.selected_model = Some(model.to_string());
        config.save_to(path)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("charla").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.selected_model, None);
        assert_eq!(config.system_prompt, None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            selected_model: Some("gpt-oss-120b/latest".to_string()),
            system_prompt: Some("Answer in one sentence.".to_string()),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn save_selected_model_keeps_prompt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        Config {
            selected_model: Some("old".to_string()),
            system_prompt: Some("keep me".to_string()),
        }
        .save_to(&path)
        .unwrap();

        Config::save_selected_model(&path, "new").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.selected_model.as_deref(), Some("new"));
        assert_eq!(loaded.system_prompt.as_deref(), Some("keep me"));
    }
}
