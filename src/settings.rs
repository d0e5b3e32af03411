use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::openai_vision::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_PROMPT};
use crate::ai::{ImageDetail, ProviderConfig};
use crate::voice::TriggerPhrases;

const DEFAULT_AUTO_LOOP_DELAY_SECS: f64 = 5.0;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings io: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("settings encode: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub image_detail: ImageDetail,
    pub prompt: String,
    /// Edge length of the square frame sent upstream.
    pub capture_size: u32,
    pub jpeg_quality: u8,
    pub trigger_phrases: Vec<String>,
    pub auto_loop_delay_secs: f64,
    /// 0 disables the client-side timeout.
    pub request_timeout_secs: u64,
    /// Acquire a camera and start listening as soon as a credential is known.
    pub auto_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: 300,
            image_detail: ImageDetail::Low,
            prompt: DEFAULT_PROMPT.into(),
            capture_size: 512,
            jpeg_quality: 70,
            trigger_phrases: vec!["snap".into()],
            auto_loop_delay_secs: DEFAULT_AUTO_LOOP_DELAY_SECS,
            request_timeout_secs: 60,
            auto_start: true,
        }
    }
}

/// `<config_dir>/snapsight`, falling back to the working directory.
pub fn config_dir() -> PathBuf {
    let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("snapsight");
    p
}

impl Settings {
    pub fn default_path() -> PathBuf {
        config_dir().join("settings.toml")
    }

    /// Load settings, returning defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            max_tokens: self.max_tokens,
            detail: self.image_detail,
            timeout: (self.request_timeout_secs > 0)
                .then(|| Duration::from_secs(self.request_timeout_secs)),
        }
    }

    pub fn trigger_phrases(&self) -> TriggerPhrases {
        TriggerPhrases::new(&self.trigger_phrases)
    }

    /// Negative or NaN clamps to zero; a value too large for a `Duration`
    /// falls back to the default.
    pub fn auto_loop_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.auto_loop_delay_secs.max(0.0)).unwrap_or_else(|e| {
            log::warn!(
                "autoLoopDelaySecs = {} is unusable ({}); using {}s",
                self.auto_loop_delay_secs,
                e,
                DEFAULT_AUTO_LOOP_DELAY_SECS
            );
            Duration::from_secs_f64(DEFAULT_AUTO_LOOP_DELAY_SECS)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("snapsight-settings-{}-{}", std::process::id(), name))
            .join("settings.toml")
    }

    #[test]
    fn missing_file_yields_defaults() {
        let s = Settings::load(&temp_path("missing")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.auto_loop_delay(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let s: Settings = toml::from_str("triggerPhrases = [\"snap\", \"capture photo\"]\nimageDetail = \"high\"\n").unwrap();
        assert_eq!(s.trigger_phrases.len(), 2);
        assert_eq!(s.image_detail, ImageDetail::High);
        assert_eq!(s.capture_size, 512);
    }

    #[test]
    fn oversized_auto_loop_delay_falls_back_to_default() {
        let s: Settings = toml::from_str("autoLoopDelaySecs = inf\n").unwrap();
        assert_eq!(s.auto_loop_delay(), Duration::from_secs(5));

        let s: Settings = toml::from_str("autoLoopDelaySecs = 1e30\n").unwrap();
        assert_eq!(s.auto_loop_delay(), Duration::from_secs(5));

        let s: Settings = toml::from_str("autoLoopDelaySecs = -3.0\n").unwrap();
        assert_eq!(s.auto_loop_delay(), Duration::ZERO);

        let s: Settings = toml::from_str("autoLoopDelaySecs = 2.5\n").unwrap();
        assert_eq!(s.auto_loop_delay(), Duration::from_millis(2500));
    }

    #[test]
    fn save_then_load() {
        let path = temp_path("save");
        let mut s = Settings::default();
        s.model = "gpt-4o".into();
        s.request_timeout_secs = 0;
        s.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.model, "gpt-4o");
        assert!(loaded.provider_config().timeout.is_none());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
