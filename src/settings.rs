use std::path::PathBuf;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::PipelineError;

const ENV_PREFIX: &str = "BLOCKDOC";
const SETTINGS_FILE: &str = "blockdoc";

/// Runtime settings: defaults, then `blockdoc.{toml,yaml,json}`, then `BLOCKDOC_*` env.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_kb_path")]
    pub kb_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_pandoc_bin")]
    pub pandoc_bin: PathBuf,
    #[serde(default)]
    pub drive_key_file: Option<PathBuf>,
    #[serde(default)]
    pub drive_folder_id: Option<String>,
    #[serde(default = "default_scope_runs")]
    pub scope_runs: bool,
}

fn default_gemini_model() -> String {
    "gemini-2.5-pro-exp-03-25".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_kb_path() -> PathBuf {
    PathBuf::from("data/block_kb.yaml")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/blockdoc.sqlite")
}

fn default_pandoc_bin() -> PathBuf {
    PathBuf::from("pandoc")
}

fn default_scope_runs() -> bool {
    true
}

impl Settings {
    pub fn load() -> Result<Self, PipelineError> {
        let builder = Config::builder()
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX));
        let settings = Self::from_builder(builder)?;
        Ok(settings.with_key_fallback(std::env::var("GEMINI_API_KEY").ok()))
    }

    /// A blank configured key counts as unset, so the fallback still applies.
    fn with_key_fallback(mut self, fallback: Option<String>) -> Self {
        let present = |k: &String| !k.trim().is_empty();
        self.gemini_api_key = self
            .gemini_api_key
            .take()
            .filter(present)
            .or_else(|| fallback.filter(present));
        self
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, PipelineError> {
        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PipelineError::Configuration(format!("cannot load settings: {}", e)))
    }

    pub fn require_api_key(&self) -> Result<&str, PipelineError> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            PipelineError::Configuration(
                "no Gemini API key (set GEMINI_API_KEY or BLOCKDOC_GEMINI_API_KEY)".to_string(),
            )
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Where one run writes its files.
    pub fn run_output_dir(&self, run_id: &str) -> PathBuf {
        if self.scope_runs {
            self.output_dir.join(run_id)
        } else {
            self.output_dir.clone()
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_sources() {
        let s = Settings::from_builder(Config::builder()).unwrap();
        assert_eq!(s.gemini_model, "gemini-2.5-pro-exp-03-25");
        assert_eq!(s.request_timeout(), Duration::from_secs(300));
        assert_eq!(s.kb_path, PathBuf::from("data/block_kb.yaml"));
        assert_eq!(s.drive_key_file, None);
        assert!(s.scope_runs);
        assert!(matches!(
            s.require_api_key(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn overrides_win() {
        let builder = Config::builder()
            .set_override("gemini_api_key", "k-123")
            .unwrap()
            .set_override("scope_runs", false)
            .unwrap()
            .set_override("output_dir", "/tmp/docs")
            .unwrap();
        let s = Settings::from_builder(builder).unwrap();
        assert_eq!(s.require_api_key().unwrap(), "k-123");
        assert_eq!(s.run_output_dir("run-1"), PathBuf::from("/tmp/docs"));
    }

    #[test]
    fn blank_key_falls_back() {
        let builder = Config::builder().set_override("gemini_api_key", "  ").unwrap();
        let s = Settings::from_builder(builder)
            .unwrap()
            .with_key_fallback(Some("env-key".into()));
        assert_eq!(s.require_api_key().unwrap(), "env-key");
    }

    #[test]
    fn configured_key_wins_over_fallback() {
        let builder = Config::builder().set_override("gemini_api_key", "file-key").unwrap();
        let s = Settings::from_builder(builder)
            .unwrap()
            .with_key_fallback(Some("env-key".into()));
        assert_eq!(s.require_api_key().unwrap(), "file-key");

        let s = Settings::from_builder(Config::builder())
            .unwrap()
            .with_key_fallback(Some(String::new()));
        assert!(s.require_api_key().is_err());
    }

    #[test]
    fn settings_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockdoc.toml");
        std::fs::write(
            &path,
            "gemini_model = \"gemini-2.0-flash\"\ndrive_folder_id = \"abc\"\nrequest_timeout_secs = 30\n",
        )
        .unwrap();
        let builder = Config::builder().add_source(File::from(path));
        let s = Settings::from_builder(builder).unwrap();
        assert_eq!(s.gemini_model, "gemini-2.0-flash");
        assert_eq!(s.drive_folder_id.as_deref(), Some("abc"));
        assert_eq!(s.request_timeout_secs, 30);
        assert_eq!(s.run_output_dir("run-7"), PathBuf::from("output/run-7"));
    }

    #[test]
    fn bad_value_is_configuration_error() {
        let builder = Config::builder()
            .set_override("request_timeout_secs", "soon")
            .unwrap();
        assert!(matches!(
            Settings::from_builder(builder),
            Err(PipelineError::Configuration(_))
        ));
    }
}
