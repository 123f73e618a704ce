use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    Relaxed,
    #[default]
    Standard,
    Strict,
}

impl VerificationLevel {
    pub fn loop_config(self) -> LoopConfig {
        match self {
            VerificationLevel::Relaxed => LoopConfig { pass_threshold: 0.85, max_iterations: 2 },
            VerificationLevel::Standard => LoopConfig { pass_threshold: 0.9, max_iterations: 3 },
            VerificationLevel::Strict => LoopConfig { pass_threshold: 0.95, max_iterations: 5 },
        }
    }
}

impl FromStr for VerificationLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Ok(VerificationLevel::Relaxed),
            "standard" => Ok(VerificationLevel::Standard),
            "strict" => Ok(VerificationLevel::Strict),
            other => Err(ConfigError::Level(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub pass_threshold: f64,
    pub max_iterations: u32,
}

impl Default for LoopConfig {
    fn default() -> Self { VerificationLevel::default().loop_config() }
}

impl LoopConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(ConfigError::Threshold(self.pass_threshold));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Iterations);
        }
        Ok(self)
    }

    pub fn with_overrides(mut self, pass_threshold: Option<f64>, max_iterations: Option<u32>) -> Result<Self, ConfigError> {
        if let Some(t) = pass_threshold { self.pass_threshold = t; }
        if let Some(n) = max_iterations { self.max_iterations = n; }
        self.validate()
    }
}

/// Process settings: built-in defaults, then an optional TOML file, then `VERILOOP_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub checker_model: String,
    pub reviser_model: String,
    pub llm_concurrency: usize,
    pub collaborator_timeout_secs: u64,
    pub serper_api_key: Option<String>,
    pub serper_qps: u32,
    pub search_res_num: usize,
    pub level: VerificationLevel,
    pub pass_threshold: Option<f64>,
    pub max_iterations: Option<u32>,
    pub listen_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: None,
            checker_model: "gpt-4o".into(),
            reviser_model: "gpt-4o".into(),
            llm_concurrency: 8,
            collaborator_timeout_secs: 120,
            serper_api_key: None,
            serper_qps: 5,
            search_res_num: 10,
            level: VerificationLevel::Standard,
            pass_threshold: None,
            max_iterations: None,
            listen_addr: "127.0.0.1:8080".into(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(p) = path {
            builder = builder.add_source(config::File::with_name(p).required(true));
        }
        let cfg = builder
            .add_source(config::Environment::with_prefix("VERILOOP").try_parsing(true))
            .build()?;
        let settings: Settings = cfg.try_deserialize()?;
        settings.loop_config()?;
        Ok(settings)
    }

    pub fn loop_config(&self) -> Result<LoopConfig, ConfigError> {
        self.level.loop_config().with_overrides(self.pass_threshold, self.max_iterations)
    }
}
