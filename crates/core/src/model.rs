//! Decoder-only transformer (GPT-style) used as the default on-device model.
//!
//! Learned token and position embeddings, pre-norm blocks, GELU MLP.
//! Weight tying between token embedding and output projection (no `lm_head`).

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{embedding, layer_norm, linear, Embedding, LayerNorm, Linear, Module, VarBuilder, VarMap};

use agrilm_common::EngineError;

use crate::attention::CausalSelfAttention;
use crate::config::ModelConfig;
use crate::device::device_label;
use crate::outputs::{LanguageModel, ModelOutputs};

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

// ── MLP ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Mlp {
    c_fc: Linear,
    c_proj: Linear,
}

impl Mlp {
    fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let c_fc = linear(config.hidden_size, config.intermediate_size, vb.pp("c_fc"))?;
        let c_proj = linear(config.intermediate_size, config.hidden_size, vb.pp("c_proj"))?;
        Ok(Self { c_fc, c_proj })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.c_proj.forward(&self.c_fc.forward(x)?.gelu()?)
    }
}

// ── Decoder Block ───────────────────────────────────────────────────────────

/// Pre-norm → attention → residual → pre-norm → MLP → residual.
#[derive(Debug)]
struct DecoderBlock {
    ln1: LayerNorm,
    attn: CausalSelfAttention,
    ln2: LayerNorm,
    mlp: Mlp,
}

impl DecoderBlock {
    fn new(config: &ModelConfig, head_dim: usize, vb: VarBuilder) -> Result<Self> {
        let eps = config.layer_norm_eps;
        Ok(Self {
            ln1: layer_norm(config.hidden_size, eps, vb.pp("ln1"))?,
            attn: CausalSelfAttention::new(config, head_dim, vb.pp("attn"))?,
            ln2: layer_norm(config.hidden_size, eps, vb.pp("ln2"))?,
            mlp: Mlp::new(config, vb.pp("mlp"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = (x + self.attn.forward(&self.ln1.forward(x)?)?)?;
        &x + self.mlp.forward(&self.ln2.forward(&x)?)?
    }
}

// ── CausalLm ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CausalLm {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<DecoderBlock>,
    ln_f: LayerNorm,
    config: ModelConfig,
    device: Device,
}

impl CausalLm {
    pub fn new(vb: VarBuilder, config: &ModelConfig) -> Result<Self> {
        let head_dim = config
            .head_dim()
            .map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        let device = vb.device().clone();

        let wte = embedding(config.vocab_size, config.hidden_size, vb.pp("wte"))?;
        let wpe = embedding(config.max_seq_len, config.hidden_size, vb.pp("wpe"))?;

        let mut blocks = Vec::with_capacity(config.num_layers);
        for i in 0..config.num_layers {
            blocks.push(DecoderBlock::new(config, head_dim, vb.pp(format!("h.{i}")))?);
        }

        let ln_f = layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("ln_f"))?;

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            config: config.clone(),
            device,
        })
    }

    /// Load from a model directory (`config.json` + `model.safetensors`) or
    /// from a `.safetensors` file with `config.json` beside it.
    pub fn load(path: &Path, device: &Device) -> agrilm_common::Result<Self> {
        let (config_path, weights_path) = model_files(path)?;
        let config = ModelConfig::load(&config_path)?;

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::new(vb, &config)?;
        varmap.load(&weights_path).map_err(|e| {
            EngineError::UnsupportedFormat(format!("{}: {e}", weights_path.display()))
        })?;

        tracing::info!(
            path = %weights_path.display(),
            layers = config.num_layers,
            hidden = config.hidden_size,
            vocab = config.vocab_size,
            device = device_label(device),
            "model loaded"
        );
        Ok(model)
    }

    /// Logits of shape `(batch, seq, vocab)`.
    pub fn logits(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (_b, t) = input_ids.dims2()?;
        if t > self.config.max_seq_len {
            return Err(candle_core::Error::Msg(format!(
                "sequence length {t} exceeds max_seq_len {}",
                self.config.max_seq_len
            )));
        }
        let positions = Tensor::arange(0u32, t as u32, &self.device)?;
        let mut x = self
            .wte
            .forward(input_ids)?
            .broadcast_add(&self.wpe.forward(&positions)?)?;
        for block in &self.blocks {
            x = block.forward(&x)?;
        }
        x = self.ln_f.forward(&x)?;

        // Weight-tied output projection: logits = x @ wte^T
        let (b, t, h) = x.dims3()?;
        let logits = x.reshape((b * t, h))?.matmul(&self.wte.embeddings().t()?)?;
        logits.reshape((b, t, self.config.vocab_size))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl LanguageModel for CausalLm {
    fn forward(&self, input_ids: &Tensor) -> Result<ModelOutputs> {
        let mut outputs = ModelOutputs::new();
        outputs.insert(self.config.output_name.clone(), self.logits(input_ids)?);
        Ok(outputs)
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn max_context(&self) -> Option<usize> {
        Some(self.config.max_seq_len)
    }

    fn vocab_size(&self) -> Option<usize> {
        Some(self.config.vocab_size)
    }

    fn describe(&self) -> String {
        format!(
            "causal-lm layers={} hidden={} heads={} vocab={} on {}",
            self.config.num_layers,
            self.config.hidden_size,
            self.config.num_heads,
            self.config.vocab_size,
            device_label(&self.device)
        )
    }
}

/// `config.json` and weights locations for a model directory or a
/// `.safetensors` file. The weights must exist; the config is not checked.
pub fn model_files(path: &Path) -> agrilm_common::Result<(PathBuf, PathBuf)> {
    if !path.exists() {
        return Err(EngineError::ModelNotFound(path.to_path_buf()));
    }
    if path.is_dir() {
        let weights = path.join(WEIGHTS_FILE);
        if !weights.is_file() {
            return Err(EngineError::ModelNotFound(weights));
        }
        return Ok((path.join(CONFIG_FILE), weights));
    }
    let is_safetensors = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("safetensors"))
        .unwrap_or(false);
    if !is_safetensors {
        return Err(EngineError::UnsupportedFormat(format!(
            "{}: expected a model directory or a .safetensors file",
            path.display()
        )));
    }
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok((dir.join(CONFIG_FILE), path.to_path_buf()))
}
