//! The fixed-window decoding loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use candle_core::Tensor;
use serde::Serialize;

use agrilm_common::{Result, RuntimeConfig};
use agrilm_core::LanguageModel;
use agrilm_tokenizer::SpecialTokens;

use crate::logits::{logits_at, LogitsResolver, LogitsShape};
use crate::sampler::Sampler;
use crate::window::{build_context_window, next_token_position};

/// Shared flag checked between decoding steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    /// Tokens the caller asked for.
    pub max_new_tokens: usize,
    /// Hard ceiling applied on top of `max_new_tokens`.
    pub max_steps_cap: usize,
    /// Context length fed to the model each step.
    pub window: usize,
    /// Smallest acceptable logits width: one past the tokenizer's highest id.
    pub min_vocab: usize,
}

impl DecodeParams {
    pub fn from_config(config: &RuntimeConfig, max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            max_steps_cap: config.max_steps_cap,
            window: config.window_size,
            min_vocab: 0,
        }
    }

    pub fn with_min_vocab(mut self, min_vocab: usize) -> Self {
        self.min_vocab = min_vocab;
        self
    }

    pub fn step_budget(&self) -> usize {
        self.max_new_tokens.min(self.max_steps_cap)
    }

    /// Shape a logits output of `model` must have under these params.
    pub fn logits_shape(&self, model: &dyn LanguageModel) -> LogitsShape {
        LogitsShape {
            seq_len: self.window,
            min_vocab: self.min_vocab,
            vocab: model.vocab_size(),
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum StopReason {
    /// The model produced `eos` or `pad`; the token is not kept.
    EndOfSequence { token: u32 },
    StepBudget,
    /// No candidate output name resolved to a logits tensor.
    OutputNotFound { available: Vec<String> },
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfSequence { token } => write!(f, "end of sequence (token {token})"),
            Self::StepBudget => write!(f, "step budget reached"),
            Self::OutputNotFound { available } => {
                write!(f, "no logits output among [{}]", available.join(", "))
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    /// Generated ids only, prompt excluded.
    pub tokens: Vec<u32>,
    pub stop_reason: StopReason,
    /// Forward passes run.
    pub steps: usize,
}

/// Autoregressively extend `prompt` one token per forward pass.
///
/// Each step re-runs the model on the full window; there is no KV cache.
/// A missing logits output ends the loop with whatever was generated so far.
pub fn decode_loop(
    model: &dyn LanguageModel,
    sampler: &mut Sampler,
    prompt: &[u32],
    params: &DecodeParams,
    specials: SpecialTokens,
    resolver: &LogitsResolver,
    cancel: &CancelFlag,
) -> Result<DecodeOutcome> {
    let mut sequence = prompt.to_vec();
    let mut generated = Vec::new();
    let budget = params.step_budget();
    let expected = params.logits_shape(model);

    for step in 0..budget {
        if cancel.is_cancelled() {
            tracing::debug!(step, "generation cancelled");
            return Ok(finish(generated, StopReason::Cancelled, step));
        }

        let window = build_context_window(&sequence, params.window, specials.pad);
        let input = Tensor::from_vec(window, (1, params.window), model.device())?;
        let outputs = model.forward(&input)?;

        let Some((name, logits)) = resolver.resolve(&outputs, &expected) else {
            let available = outputs.names();
            tracing::warn!(step, ?available, "no logits output found, stopping early");
            return Ok(finish(generated, StopReason::OutputNotFound { available }, step + 1));
        };

        let pos = next_token_position(sequence.len(), params.window);
        let row = logits_at(logits, pos)?;
        let token = sampler.select_token(&row);
        tracing::debug!(step, output = name, pos, token, "sampled");

        if specials.is_stop(token) {
            return Ok(finish(generated, StopReason::EndOfSequence { token }, step + 1));
        }
        sequence.push(token);
        generated.push(token);
    }

    Ok(finish(generated, StopReason::StepBudget, budget))
}

fn finish(tokens: Vec<u32>, stop_reason: StopReason, steps: usize) -> DecodeOutcome {
    DecodeOutcome {
        tokens,
        stop_reason,
        steps,
    }
}
