use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};

use crate::analyze::DEFAULT_PROMPT;
use crate::error::ScanError;

#[derive(Deserialize)]
pub struct Config {
    pub vision: VisionSection,
    pub storage: Option<StorageSection>,
    prompt: Option<PromptSection>,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "scans/scans.db".to_string()
}

/// Which deployment variant `scan` uses: call the vision endpoint straight
/// from this process, or hand the stored image off to a relay that holds
/// the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Direct,
    Relay,
}

#[derive(Deserialize)]
pub struct VisionSection {
    pub backend: Backend,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_relay_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

#[derive(Deserialize)]
pub struct StorageSection {
    pub base_url: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

fn default_bucket() -> String {
    "boxes".to_string()
}

#[derive(Deserialize)]
struct PromptSection {
    text: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ScanError::Config(e.to_string()))
    }

    /// The analysis instruction: the user's saved text, or the built-in
    /// default when none has been saved yet.
    pub fn prompt_text(&self) -> &str {
        match &self.prompt {
            Some(section) => &section.text,
            None => DEFAULT_PROMPT,
        }
    }

    pub fn has_saved_prompt(&self) -> bool {
        self.prompt.is_some()
    }

    /// Persist a new instruction text into the config file in place,
    /// leaving the rest of the document untouched.
    pub fn update_prompt(path: impl AsRef<Path>, new_text: &str) -> Result<(), ScanError> {
        let content = fs::read_to_string(&path)?;
        let mut doc = content
            .parse::<DocumentMut>()
            .map_err(|e| ScanError::Config(e.to_string()))?;

        doc["prompt"]["text"] = value(new_text);

        fs::write(&path, doc.to_string())?;
        Ok(())
    }

    /// Remove the saved instruction so the default applies again.
    pub fn reset_prompt(path: impl AsRef<Path>) -> Result<(), ScanError> {
        let content = fs::read_to_string(&path)?;
        let mut doc = content
            .parse::<DocumentMut>()
            .map_err(|e| ScanError::Config(e.to_string()))?;

        doc.remove("prompt");

        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
db_path = "test/scans.db"

[vision]
backend = "relay"
model = "gpt-4o"

[storage]
base_url = "https://store.example.com"

[prompt]
text = "minha instrução"
"#;

    #[test]
    fn test_parse_sample() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.vision.backend, Backend::Relay);
        assert_eq!(cfg.vision.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.db_path, "test/scans.db");
        assert_eq!(cfg.storage.as_ref().unwrap().bucket, "boxes");
        assert_eq!(cfg.prompt_text(), "minha instrução");
    }

    #[test]
    fn test_prompt_defaults_when_absent() {
        let cfg: Config = toml::from_str("[vision]\nbackend = \"direct\"\n").unwrap();
        assert!(!cfg.has_saved_prompt());
        assert_eq!(cfg.prompt_text(), DEFAULT_PROMPT);
        assert_eq!(cfg.db_path, "scans/scans.db");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: Result<Config, _> = toml::from_str("[vision]\nbackend = \"carrier-pigeon\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_update_and_reset_prompt() {
        let path = std::env::temp_dir().join(format!("medscan-cfg-{}.toml", std::process::id()));
        fs::write(&path, "[vision]\nbackend = \"direct\"\n").unwrap();

        Config::update_prompt(&path, "texto salvo").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.prompt_text(), "texto salvo");

        Config::reset_prompt(&path).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.prompt_text(), DEFAULT_PROMPT);

        fs::remove_file(&path).unwrap();
    }
}
