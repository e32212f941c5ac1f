use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StoreResult;
use crate::store::{read_json, write_json};

// --- AI Settings ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

impl AiSettings {
    /// Overlay `PARTMAP_AI_PROVIDER`, `PARTMAP_AI_MODEL` and `PARTMAP_AI_KEY`
    /// on top of the stored settings.
    pub fn with_env_overrides(mut self) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        if let Some(provider) = var("PARTMAP_AI_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = var("PARTMAP_AI_MODEL") {
            self.model = model;
        }
        if let Some(key) = var("PARTMAP_AI_KEY") {
            self.api_key = key;
        }
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.provider.is_empty()
            && !self.model.is_empty()
            && (self.provider == "ollama" || !self.api_key.is_empty())
    }
}

fn settings_path(root: &Path) -> PathBuf {
    root.join("settings.json")
}

/// Read settings from the data directory. A missing or unreadable file gives
/// the defaults (AI unconfigured).
pub fn read_settings(root: &Path) -> AiSettings {
    match read_json::<AiSettings>(&settings_path(root)) {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable settings");
            AiSettings::default()
        }
    }
}

pub fn write_settings(root: &Path, settings: &AiSettings) -> StoreResult<()> {
    write_json(&settings_path(root), settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_needs_no_key() {
        let s = AiSettings {
            provider: "ollama".into(),
            api_key: String::new(),
            model: "llama3".into(),
        };
        assert!(s.is_configured());
        let s = AiSettings {
            provider: "openai".into(),
            ..s
        };
        assert!(!s.is_configured());
        assert!(!AiSettings::default().is_configured());
    }

    #[test]
    fn settings_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_settings(dir.path()), AiSettings::default());

        let s = AiSettings {
            provider: "anthropic".into(),
            api_key: "k".into(),
            model: "m".into(),
        };
        write_settings(dir.path(), &s).unwrap();
        assert_eq!(read_settings(dir.path()), s);
    }
}
