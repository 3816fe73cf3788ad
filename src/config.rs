use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const CONFIG_ENV: &str = "COMMENCE_CONFIG";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub limits: Limits,
    pub logging: Logging,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Limits {
    pub max_template_kb: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_template_kb: 1024 }
    }
}

impl Limits {
    pub fn max_template_bytes(&self) -> u64 {
        self.max_template_kb.saturating_mul(1024)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Logging {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self { format: LogFormat::Text, filter: default_filter() }
    }
}
fn default_filter() -> String { "warn".to_string() }

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            Ok(serde_json::from_str(&raw)?)
        } else {
            Ok(toml::from_str(&raw)?)
        }
    }

    /// Loads the file named on the command line, then `COMMENCE_CONFIG`,
    /// falling back to built-in defaults when neither is given.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.limits.max_template_kb == 0 { anyhow::bail!("max_template_kb must be > 0"); }
        if self.limits.max_template_kb.checked_mul(1024).is_none() { anyhow::bail!("max_template_kb is too large"); }
        if self.logging.filter.trim().is_empty() { anyhow::bail!("logging filter must not be empty"); }
        Ok(())
    }
}
