//! Runtime configuration for the generation core.
//!
//! Serialised as JSON. Every field has a default so a minimal `{}` file
//! yields the stock behaviour: 128-slot window, 50-step cap, temperature 0.8.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Default output-tensor names searched for logits, in priority order.
pub const DEFAULT_OUTPUT_CANDIDATES: &[&str] =
    &["output", "logits", "predictions", "var_130", "Identity"];

/// Persona used by chat requests without a system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Kei, a helpful agricultural AI assistant.";

/// Knobs for loading and decoding.
///
/// Backwards-compatible: missing fields fall back to their
/// `#[serde(default)]` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // ── Decoding window ─────────────────────────────────────────────────────
    /// Fixed context length fed to the model every step.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Hard ceiling on decoding steps regardless of the caller's request.
    #[serde(default = "default_max_steps_cap")]
    pub max_steps_cap: usize,
    /// Used when the caller does not pass a token budget.
    #[serde(default = "default_max_new_tokens")]
    pub default_max_new_tokens: usize,

    // ── Sampling ────────────────────────────────────────────────────────────
    #[serde(default)]
    pub strategy: SamplingStrategy,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus cut-off: keep the most likely tokens until their mass exceeds
    /// this. `1.0` keeps the whole distribution.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Seed for the sampling RNG. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    // ── Post-processing ─────────────────────────────────────────────────────
    /// Longest run of one repeated token kept after generation.
    #[serde(default = "default_max_repeat_run")]
    pub max_repeat_run: usize,

    // ── Chat ────────────────────────────────────────────────────────────────
    /// System prompt used when a chat request does not bring its own.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    // ── Model / tokenizer loading ───────────────────────────────────────────
    /// Output names tried, in order, when looking for the logits tensor.
    #[serde(default = "default_output_candidates")]
    pub output_candidates: Vec<String>,
    /// Minimum vocabulary size for a file-backed tokenizer to be accepted.
    #[serde(default = "default_min_vocab_tokens")]
    pub min_vocab_tokens: usize,
    #[serde(default)]
    pub compute: ComputeBackend,
    /// Run one forward pass right after loading to check the output names.
    #[serde(default = "default_true")]
    pub warm_up: bool,
}

// ── Default value functions ─────────────────────────────────────────────────

fn default_window_size() -> usize {
    128
}
fn default_max_steps_cap() -> usize {
    50
}
fn default_max_new_tokens() -> usize {
    50
}
fn default_temperature() -> f32 {
    0.8
}
fn default_top_p() -> f32 {
    1.0
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_max_repeat_run() -> usize {
    2
}
fn default_output_candidates() -> Vec<String> {
    DEFAULT_OUTPUT_CANDIDATES
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_min_vocab_tokens() -> usize {
    100
}
fn default_true() -> bool {
    true
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            max_steps_cap: default_max_steps_cap(),
            default_max_new_tokens: default_max_new_tokens(),
            strategy: SamplingStrategy::default(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            seed: None,
            system_prompt: default_system_prompt(),
            max_repeat_run: default_max_repeat_run(),
            output_candidates: default_output_candidates(),
            min_vocab_tokens: default_min_vocab_tokens(),
            compute: ComputeBackend::default(),
            warm_up: true,
        }
    }
}

impl RuntimeConfig {
    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(EngineError::Config("window_size must be > 0".into()));
        }
        if self.max_steps_cap == 0 {
            return Err(EngineError::Config("max_steps_cap must be > 0".into()));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(EngineError::Config(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if self.output_candidates.is_empty() {
            return Err(EngineError::Config(
                "output_candidates must name at least one tensor".into(),
            ));
        }
        Ok(())
    }
}

/// How the next token is picked from one step's logits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Arg-max, temperature ignored.
    Greedy,
    /// Temperature-scaled softmax draw.
    #[default]
    Temperature,
}

/// Compute-device preference passed in by the host application.
///
/// Accepts both the host's historical spellings (`cpuOnly`, `cpuAndGPU`,
/// `neuralEngine`, `all`) and short forms (`cpu`, `cpu+gpu`, `accelerated`,
/// `auto`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeBackend {
    #[serde(rename = "cpu", alias = "cpuOnly")]
    Cpu,
    #[serde(rename = "cpu+gpu", alias = "cpuAndGPU")]
    CpuAndGpu,
    #[serde(rename = "accelerated", alias = "neuralEngine")]
    Accelerated,
    #[default]
    #[serde(rename = "auto", alias = "all")]
    Auto,
}

impl ComputeBackend {
    /// Like [`FromStr`] but unknown spellings resolve to [`ComputeBackend::Auto`].
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::CpuAndGpu => "cpu+gpu",
            Self::Accelerated => "accelerated",
            Self::Auto => "auto",
        }
    }
}

impl FromStr for ComputeBackend {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" | "cpuOnly" => Ok(Self::Cpu),
            "cpu+gpu" | "cpuAndGPU" | "gpu" => Ok(Self::CpuAndGpu),
            "accelerated" | "neuralEngine" => Ok(Self::Accelerated),
            "auto" | "all" => Ok(Self::Auto),
            other => Err(EngineError::Config(format!(
                "unknown compute backend '{other}'"
            ))),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
