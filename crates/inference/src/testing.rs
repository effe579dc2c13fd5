//! Test double standing in for a real model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use candle_core::{Device, Result, Tensor};
use parking_lot::Mutex;

use agrilm_core::{LanguageModel, ModelOutputs};

const VOCAB: usize = 4096;
const EOS: u32 = 1;
const PAD: u32 = 0;

/// Emits a fixed token script, one id per forward pass.
///
/// Only the row at the last non-pad slot carries the scripted token; every
/// other row favours `eos`, so reading the wrong position ends generation.
pub struct ScriptedModel {
    script: Vec<u32>,
    repeat: Option<u32>,
    output_name: String,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
    inputs: Mutex<Vec<Vec<u32>>>,
    device: Device,
}

impl ScriptedModel {
    /// Plays `script`, then `eos` forever.
    pub fn new(script: Vec<u32>) -> Self {
        Self {
            script,
            repeat: None,
            output_name: "logits".into(),
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            device: Device::Cpu,
        }
    }

    pub fn repeating(token: u32) -> Self {
        Self {
            repeat: Some(token),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_output_name(mut self, name: &str) -> Self {
        self.output_name = name.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<Vec<u32>> {
        self.inputs.lock().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn forward(&self, input_ids: &Tensor) -> Result<ModelOutputs> {
        if self.fail {
            return Err(candle_core::Error::Msg("scripted failure".into()));
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let step = self.calls.fetch_add(1, Ordering::SeqCst);
        let ids: Vec<u32> = input_ids.squeeze(0)?.to_vec1()?;
        let window = ids.len();
        let last = ids.iter().filter(|&&id| id != PAD).count().saturating_sub(1);
        self.inputs.lock().push(ids);

        let target = match self.repeat {
            Some(token) => token,
            None => self.script.get(step).copied().unwrap_or(EOS),
        };
        let mut data = vec![0f32; window * VOCAB];
        for row in 0..window {
            let hot = if row == last { target } else { EOS };
            data[row * VOCAB + hot as usize] = 10.0;
        }
        let logits = Tensor::from_vec(data, (1, window, VOCAB), &self.device)?;

        let mut outputs = ModelOutputs::new();
        outputs.insert(self.output_name.clone(), logits);
        Ok(outputs)
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn vocab_size(&self) -> Option<usize> {
        Some(VOCAB)
    }

    fn describe(&self) -> String {
        format!("scripted model ({} steps)", self.script.len())
    }
}
