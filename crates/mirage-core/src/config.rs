//! Application settings and TOML configuration parsing.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Top-level mirage configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirageConfig {
    /// Port the HTTP ingress listens on (loopback only).
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Directory holding the list-store files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Path to the SQLite forensic database.
    #[serde(default = "default_forensic_db_path")]
    pub forensic_db_path: PathBuf,

    /// Path to the protected artifact (the decoy source file).
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Whether every allowed engagement triggers an evolution run.
    #[serde(default = "default_true")]
    pub auto_evolve: bool,

    /// Text generator settings.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Evidence capture settings.
    #[serde(default)]
    pub evidence: EvidenceConfig,
}

/// Settings for the text generation providers.
///
/// Credentials are read from the environment; the config only names the
/// variables so keys never land in a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Environment variable holding the Anthropic API key.
    #[serde(default = "default_anthropic_key_env")]
    pub anthropic_key_env: String,

    /// Environment variable holding the OpenAI API key.
    #[serde(default = "default_openai_key_env")]
    pub openai_key_env: String,

    /// Model used on the Anthropic provider.
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,

    /// Model used on the OpenAI provider.
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    /// Hard timeout for one generation request, in seconds.
    #[serde(default = "default_generator_timeout")]
    pub request_timeout_secs: u64,
}

/// Settings for the external evidence capture collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Capture endpoint URL. Evidence capture is disabled when unset.
    pub endpoint: Option<String>,

    /// Hard timeout for one capture request, in seconds.
    #[serde(default = "default_evidence_timeout")]
    pub request_timeout_secs: u64,
}

// --- Default value functions ---

fn default_listen_port() -> u16 {
    8787
}

fn default_data_dir() -> PathBuf {
    dirs_fallback(".local/share/mirage")
}

fn default_forensic_db_path() -> PathBuf {
    dirs_fallback(".local/share/mirage/forensics.db")
}

fn default_artifact_path() -> PathBuf {
    dirs_fallback(".local/share/mirage/decoy_service.py")
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_generator_timeout() -> u64 {
    30
}

fn default_evidence_timeout() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

/// Resolve a path relative to the user's home directory.
fn dirs_fallback(relative: &str) -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(relative)
    } else {
        PathBuf::from("/tmp").join(relative)
    }
}

// --- Trait impls ---

impl Default for MirageConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            data_dir: default_data_dir(),
            forensic_db_path: default_forensic_db_path(),
            artifact_path: default_artifact_path(),
            auto_evolve: true,
            generator: GeneratorConfig::default(),
            evidence: EvidenceConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            anthropic_key_env: default_anthropic_key_env(),
            openai_key_env: default_openai_key_env(),
            anthropic_model: default_anthropic_model(),
            openai_model: default_openai_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            request_timeout_secs: default_generator_timeout(),
        }
    }
}

impl MirageConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: MirageConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = MirageConfig::load(Path::new("/nonexistent/mirage.toml")).unwrap();
        assert_eq!(config.listen_port, 8787);
        assert!(config.auto_evolve);
        assert!(config.evidence.endpoint.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml = r#"
            listen_port = 9000

            [generator]
            anthropic_model = "claude-test"
        "#;
        let config: MirageConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.generator.anthropic_model, "claude-test");
        assert_eq!(config.generator.openai_model, "gpt-4o-mini");
        assert_eq!(config.generator.request_timeout_secs, 30);
    }

    #[test]
    fn evidence_endpoint_parses() {
        let toml = r#"
            [evidence]
            endpoint = "http://127.0.0.1:9999/capture"
            request_timeout_secs = 5
        "#;
        let config: MirageConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.evidence.endpoint.as_deref(),
            Some("http://127.0.0.1:9999/capture")
        );
        assert_eq!(config.evidence.request_timeout_secs, 5);
    }
}
