//! Model hyper-parameters, stored as `config.json` next to the weights.

use std::path::Path;

use serde::{Deserialize, Serialize};

use agrilm_common::{EngineError, Result};

/// Configuration for the decoder-only [`CausalLm`](crate::CausalLm).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Vocabulary size (must cover every id the tokenizer can emit).
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    /// MLP inner dimension.
    pub intermediate_size: usize,
    /// Number of learned positions; the decoding window must fit.
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    /// Name the logits tensor is published under. Exporters disagree on it.
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

fn default_max_seq_len() -> usize {
    128
}
fn default_layer_norm_eps() -> f64 {
    1e-5
}
fn default_output_name() -> String {
    "logits".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 32000,
            hidden_size: 256,
            num_heads: 8,
            num_layers: 4,
            intermediate_size: 1024,
            max_seq_len: default_max_seq_len(),
            layer_norm_eps: default_layer_norm_eps(),
            output_name: default_output_name(),
        }
    }
}

impl ModelConfig {
    /// Head dimension, or a config error when `hidden_size` does not split evenly.
    pub fn head_dim(&self) -> Result<usize> {
        if self.num_heads == 0 || self.hidden_size % self.num_heads != 0 {
            return Err(EngineError::Config(format!(
                "hidden_size ({}) must be divisible by num_heads ({})",
                self.hidden_size, self.num_heads
            )));
        }
        Ok(self.hidden_size / self.num_heads)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.head_dim()?;
        Ok(config)
    }
}
