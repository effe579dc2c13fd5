//! Locating the logits tensor among a model's named outputs.

use candle_core::{DType, IndexOp, Result, Tensor};

use agrilm_common::config::DEFAULT_OUTPUT_CANDIDATES;
use agrilm_core::ModelOutputs;

/// Ordered list of output names that may carry logits.
#[derive(Debug, Clone)]
pub struct LogitsResolver {
    candidates: Vec<String>,
}

impl Default for LogitsResolver {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_CANDIDATES.iter().map(|s| s.to_string()))
    }
}

impl LogitsResolver {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// First candidate present as a float tensor shaped `[.., seq, vocab]`
    /// for the given expectations.
    pub fn resolve<'a>(
        &self,
        outputs: &'a ModelOutputs,
        expected: &LogitsShape,
    ) -> Option<(&'a str, &'a Tensor)> {
        self.candidates.iter().find_map(|name| {
            outputs
                .iter()
                .find(|(n, t)| *n == name.as_str() && expected.matches(t))
        })
    }
}

/// What a logits tensor must look like for one decoding setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogitsShape {
    /// Window length fed to the model. A sequence dim of 1 (last step only)
    /// is accepted too.
    pub seq_len: usize,
    /// Every id the tokenizer can emit needs a logit.
    pub min_vocab: usize,
    /// The model's own vocabulary size, when it reports one. The logits
    /// width must then match it exactly.
    pub vocab: Option<usize>,
}

impl LogitsShape {
    pub fn matches(&self, t: &Tensor) -> bool {
        let dims = t.dims();
        if !t.dtype().is_float() || dims.len() < 2 {
            return false;
        }
        let seq = dims[dims.len() - 2];
        let vocab = dims[dims.len() - 1];
        let seq_ok = seq == self.seq_len || seq == 1;
        let vocab_ok =
            vocab >= self.min_vocab.max(1) && self.vocab.map_or(true, |expected| vocab == expected);
        seq_ok && vocab_ok
    }
}

/// Vocabulary row at sequence position `pos` as `f32`.
///
/// Leading batch dims are indexed at 0. `pos` is clamped to the last
/// position, so exports that only return the final step still work.
pub fn logits_at(logits: &Tensor, pos: usize) -> Result<Vec<f32>> {
    let mut t = logits.clone();
    while t.rank() > 2 {
        t = t.i(0)?;
    }
    let seq = t.dim(0)?;
    let pos = pos.min(seq.saturating_sub(1));
    t.i(pos)?.to_dtype(DType::F32)?.to_vec1()
}
