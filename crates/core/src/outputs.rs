//! Model interface and its named-output container.

use candle_core::{Device, Result, Tensor};

/// Named output tensors of one forward pass, in publication order.
///
/// Export tools disagree on the name of the logits tensor, so callers look
/// it up by a list of candidate names rather than a fixed constant.
#[derive(Debug, Clone, Default)]
pub struct ModelOutputs {
    entries: Vec<(String, Tensor)>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the tensor published under `name`.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = tensor,
            None => self.entries.push((name, tensor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A causal language model driven one fixed-size window at a time.
///
/// `input_ids` is a `(1, window)` `u32` tensor on [`LanguageModel::device`].
/// Implementations must not mutate shared state in `forward`; the session
/// guarantees only that loads and generations do not overlap.
pub trait LanguageModel: Send + Sync {
    fn forward(&self, input_ids: &Tensor) -> Result<ModelOutputs>;

    fn device(&self) -> &Device;

    /// Longest window the model accepts, if it has a limit.
    fn max_context(&self) -> Option<usize> {
        None
    }

    /// Number of logits per position, if known up front.
    fn vocab_size(&self) -> Option<usize> {
        None
    }

    /// One-line description for logs.
    fn describe(&self) -> String;
}
