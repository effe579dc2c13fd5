//! Lock-guarded model handle: load, generate, unload.
//!
//! One mutex covers the resident model, tokenizer and sampler. `load` and
//! `generate` both hold it for their whole duration, so a model is never
//! swapped out underneath a running generation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use candle_core::Tensor;
use parking_lot::Mutex;
use serde::Serialize;

use agrilm_common::{ComputeBackend, EngineError, Result, RuntimeConfig};
use agrilm_core::{device_label, model_files, select_device, CausalLm, LanguageModel};
use agrilm_tokenizer::{SpecialTokens, Tokenizer, TokenizerLoader};

use crate::decode::{decode_loop, CancelFlag, DecodeParams, StopReason};
use crate::logits::{logits_at, LogitsResolver, LogitsShape};
use crate::metrics::PerformanceMetrics;
use crate::postprocess::collapse_repeats;
use crate::sampler::{Sampler, SamplerConfig, SamplingOverrides};
use crate::window::{build_context_window, next_token_position};

/// What the host passes to `initializeModel`.
#[derive(Debug, Clone)]
pub struct InitRequest {
    pub model_path: PathBuf,
    /// Explicit tokenizer asset; otherwise looked up beside the model.
    pub tokenizer_path: Option<PathBuf>,
    pub compute: ComputeBackend,
}

impl InitRequest {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            tokenizer_path: None,
            compute: ComputeBackend::Auto,
        }
    }

    fn tokenizer_loader(&self, min_tokens: usize) -> TokenizerLoader {
        let loader = match &self.tokenizer_path {
            Some(path) => TokenizerLoader::for_path(path),
            None if self.model_path.is_dir() => TokenizerLoader::discover(&self.model_path),
            None => TokenizerLoader::discover(self.model_path.parent().unwrap_or(Path::new("."))),
        };
        loader.with_min_tokens(min_tokens)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Ready,
    Decoding,
}

/// Result of one `generate` call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub text: String,
    /// Generated ids after repeat collapsing.
    pub tokens: Vec<u32>,
    pub prompt_tokens: usize,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

impl GenerationOutput {
    /// Nothing printable was produced. A soft failure: the caller may retry.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// One forward pass over caller-supplied ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedTokens {
    /// Output name the logits were read from.
    pub output: String,
    /// Full shape of that output.
    pub shape: Vec<usize>,
    /// Logits row predicting the token after the last input id.
    pub logits: Vec<f32>,
}

/// What `getModelInfo` reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub loaded: bool,
    /// Path the resident model came from; `None` for installed models.
    pub model_path: Option<PathBuf>,
    /// The model files are still on disk.
    pub exists: bool,
    /// Model description, or `"Not loaded"`.
    pub configuration: String,
    pub tokenizer: Option<String>,
    pub vocab_size: Option<usize>,
}

struct LoadedModel {
    model: Box<dyn LanguageModel>,
    tokenizer: Box<dyn Tokenizer>,
    sampler: Sampler,
    source: Option<PathBuf>,
}

impl LoadedModel {
    fn decode_params(&self, config: &RuntimeConfig, max_new_tokens: usize) -> DecodeParams {
        DecodeParams::from_config(config, max_new_tokens)
            .with_min_vocab(min_vocab(self.tokenizer.as_ref()))
    }
}

pub struct InferenceSession {
    config: RuntimeConfig,
    resolver: LogitsResolver,
    state: Mutex<Option<LoadedModel>>,
    loaded: AtomicBool,
    decoding: AtomicBool,
    metrics: Mutex<PerformanceMetrics>,
}

impl Default for InferenceSession {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl InferenceSession {
    pub fn new(config: RuntimeConfig) -> Self {
        let resolver = LogitsResolver::new(config.output_candidates.iter().cloned());
        let metrics = PerformanceMetrics {
            max_sequence_length: config.window_size,
            ..Default::default()
        };
        Self {
            config,
            resolver,
            state: Mutex::new(None),
            loaded: AtomicBool::new(false),
            decoding: AtomicBool::new(false),
            metrics: Mutex::new(metrics),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        if self.decoding.load(Ordering::SeqCst) {
            SessionPhase::Decoding
        } else if self.loaded.load(Ordering::SeqCst) {
            SessionPhase::Ready
        } else {
            SessionPhase::Idle
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Make an already-built model resident, replacing any previous one.
    pub fn install(
        &self,
        model: Box<dyn LanguageModel>,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        self.check_context(model.as_ref())?;
        check_vocab(model.as_ref(), tokenizer.as_ref())?;
        self.put(&mut state, model, tokenizer, None);
        Ok(())
    }

    /// Load a `CausalLm` and its tokenizer from disk.
    ///
    /// On failure the previous state (loaded or not) is left untouched.
    pub fn load(&self, request: &InitRequest) -> Result<()> {
        let mut state = self.state.lock();

        let device = select_device(request.compute)?;
        tracing::info!(
            requested = request.compute.as_str(),
            device = device_label(&device),
            "compute backend selected"
        );
        let model = CausalLm::load(&request.model_path, &device)?;
        self.check_context(&model)?;

        let tokenizer = request.tokenizer_loader(self.config.min_vocab_tokens).load();
        check_vocab(&model, tokenizer.as_ref())?;
        if self.config.warm_up {
            self.warm_up(&model, tokenizer.as_ref())?;
        }

        self.put(
            &mut state,
            Box::new(model),
            tokenizer,
            Some(request.model_path.clone()),
        );
        Ok(())
    }

    pub fn unload(&self) {
        let mut state = self.state.lock();
        if state.take().is_some() {
            tracing::info!("model unloaded");
        }
        self.loaded.store(false, Ordering::SeqCst);
        let mut metrics = self.metrics.lock();
        metrics.model_loaded = false;
        metrics.backend.clear();
    }

    pub fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<GenerationOutput> {
        self.generate_with_cancel(prompt, max_new_tokens, &CancelFlag::new())
    }

    pub fn generate_with_cancel(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        cancel: &CancelFlag,
    ) -> Result<GenerationOutput> {
        self.generate_with(prompt, max_new_tokens, SamplingOverrides::default(), cancel)
    }

    /// Encode → decode loop → collapse repeats → detokenize.
    ///
    /// `overrides` apply to this call only; the configured sampler is
    /// restored afterwards, also on failure.
    pub fn generate_with(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        overrides: SamplingOverrides,
        cancel: &CancelFlag,
    ) -> Result<GenerationOutput> {
        overrides.validate()?;
        let mut state = self.state.lock();
        let loaded = state.as_mut().ok_or(EngineError::ModelNotLoaded)?;
        let _decoding = DecodingGuard::enter(&self.decoding);

        let start = Instant::now();
        let specials = loaded.tokenizer.special_tokens();
        let prompt_ids = loaded.tokenizer.encode(prompt);
        let params = loaded.decode_params(&self.config, max_new_tokens);

        let configured = loaded.sampler.config().clone();
        if !overrides.is_empty() {
            loaded.sampler.set_config(overrides.apply(&configured));
        }
        let outcome = decode_loop(
            loaded.model.as_ref(),
            &mut loaded.sampler,
            &prompt_ids,
            &params,
            specials,
            &self.resolver,
            cancel,
        );
        loaded.sampler.set_config(configured);
        let outcome = outcome?;

        let tokens = collapse_repeats(&outcome.tokens, self.config.max_repeat_run);
        let text = loaded.tokenizer.decode(&tokens);
        let elapsed = start.elapsed();
        self.metrics
            .lock()
            .record_generation(outcome.tokens.len(), elapsed);

        tracing::info!(
            prompt_tokens = prompt_ids.len(),
            generated = outcome.tokens.len(),
            kept = tokens.len(),
            steps = outcome.steps,
            stop = %outcome.stop_reason,
            elapsed_ms = elapsed.as_millis() as u64,
            "generation finished"
        );
        if text.is_empty() {
            tracing::warn!("generation produced no text");
        }

        Ok(GenerationOutput {
            text,
            tokens,
            prompt_tokens: prompt_ids.len(),
            stop_reason: outcome.stop_reason,
            elapsed,
        })
    }

    /// Run the model once on raw ids, windowed like a decoding step.
    ///
    /// `Ok(None)` when no candidate output carries logits.
    pub fn process_tokens(&self, ids: &[u32]) -> Result<Option<ProcessedTokens>> {
        if ids.is_empty() {
            return Err(EngineError::InvalidArgument("tokenIds is empty".into()));
        }
        let state = self.state.lock();
        let loaded = state.as_ref().ok_or(EngineError::ModelNotLoaded)?;
        if let Some(vocab) = loaded.model.vocab_size() {
            if let Some(bad) = ids.iter().find(|&&id| id as usize >= vocab) {
                return Err(EngineError::InvalidArgument(format!(
                    "token id {bad} is outside the model vocabulary ({vocab})"
                )));
            }
        }
        let _decoding = DecodingGuard::enter(&self.decoding);

        let start = Instant::now();
        let window = self.config.window_size;
        let pad = loaded.tokenizer.special_tokens().pad;
        let input = Tensor::from_vec(
            build_context_window(ids, window, pad),
            (1, window),
            loaded.model.device(),
        )?;
        let outputs = loaded.model.forward(&input)?;
        let expected = loaded
            .decode_params(&self.config, 0)
            .logits_shape(loaded.model.as_ref());

        let processed = match self.resolver.resolve(&outputs, &expected) {
            Some((name, logits)) => Some(ProcessedTokens {
                output: name.to_string(),
                shape: logits.dims().to_vec(),
                logits: logits_at(logits, next_token_position(ids.len(), window))?,
            }),
            None => {
                tracing::warn!(available = ?outputs.names(), "no logits output found");
                None
            }
        };
        self.metrics.lock().record_inference(start.elapsed());
        Ok(processed)
    }

    /// [`process_tokens`](Self::process_tokens) per batch; failures become `None`.
    pub fn process_batch(&self, batches: &[Vec<u32>]) -> Vec<Option<ProcessedTokens>> {
        batches
            .iter()
            .enumerate()
            .map(|(i, ids)| match self.process_tokens(ids) {
                Ok(processed) => processed,
                Err(e) => {
                    tracing::warn!(batch = i, error = %e, "batch entry failed");
                    None
                }
            })
            .collect()
    }

    pub fn model_info(&self) -> ModelInfo {
        let state = self.state.lock();
        match state.as_ref() {
            Some(loaded) => ModelInfo {
                loaded: true,
                exists: loaded
                    .source
                    .as_deref()
                    .map(|p| model_files(p).is_ok())
                    .unwrap_or(false),
                model_path: loaded.source.clone(),
                configuration: loaded.model.describe(),
                tokenizer: Some(loaded.tokenizer.name().to_string()),
                vocab_size: loaded.model.vocab_size(),
            },
            None => ModelInfo {
                loaded: false,
                model_path: None,
                exists: false,
                configuration: "Not loaded".to_string(),
                tokenizer: None,
                vocab_size: None,
            },
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics.lock().clone()
    }

    /// Reset the performance counters. The model stays resident.
    pub fn clear_cache(&self) {
        self.metrics.lock().reset_counters();
    }

    /// Release the model and tokenizer.
    pub fn dispose(&self) {
        self.unload();
    }

    fn put(
        &self,
        state: &mut Option<LoadedModel>,
        model: Box<dyn LanguageModel>,
        tokenizer: Box<dyn Tokenizer>,
        source: Option<PathBuf>,
    ) {
        let backend = device_label(model.device()).to_string();
        tracing::info!(
            model = %model.describe(),
            tokenizer = tokenizer.name(),
            vocab = tokenizer.vocab_size(),
            "model ready"
        );
        *state = Some(LoadedModel {
            model,
            tokenizer,
            sampler: Sampler::new(SamplerConfig::from(&self.config)),
            source,
        });
        self.loaded.store(true, Ordering::SeqCst);

        let mut metrics = self.metrics.lock();
        metrics.reset_counters();
        metrics.model_loaded = true;
        metrics.max_sequence_length = self.config.window_size;
        metrics.backend = backend;
    }

    fn check_context(&self, model: &dyn LanguageModel) -> Result<()> {
        match model.max_context() {
            Some(max) if max < self.config.window_size => Err(EngineError::Config(format!(
                "model accepts {max} positions but the decoding window is {}",
                self.config.window_size
            ))),
            _ => Ok(()),
        }
    }

    /// One forward pass on a `bos`-only window to report the output names.
    fn warm_up(&self, model: &dyn LanguageModel, tokenizer: &dyn Tokenizer) -> Result<()> {
        let specials: SpecialTokens = tokenizer.special_tokens();
        let window = self.config.window_size;
        let ids = build_context_window(&[specials.bos], window, specials.pad);
        let input = Tensor::from_vec(ids, (1, window), model.device())?;
        let outputs = model.forward(&input)?;
        let names = outputs.names();
        tracing::debug!(?names, "model outputs");
        let expected = LogitsShape {
            seq_len: window,
            min_vocab: min_vocab(tokenizer),
            vocab: model.vocab_size(),
        };
        match self.resolver.resolve(&outputs, &expected) {
            Some((name, logits)) => {
                tracing::info!(output = name, shape = ?logits.dims(), "logits output found")
            }
            None => tracing::warn!(
                ?names,
                candidates = ?self.resolver.candidates(),
                "no candidate output name matches, generation will return empty text"
            ),
        }
        Ok(())
    }
}

fn min_vocab(tokenizer: &dyn Tokenizer) -> usize {
    tokenizer.max_id().map(|id| id as usize + 1).unwrap_or(0)
}

/// Every id the tokenizer can emit must index a row of the model's logits.
fn check_vocab(model: &dyn LanguageModel, tokenizer: &dyn Tokenizer) -> Result<()> {
    match (model.vocab_size(), tokenizer.max_id()) {
        (Some(vocab), Some(max)) if max as usize >= vocab => Err(EngineError::Config(format!(
            "{} tokenizer ids reach {max} but the model vocabulary has {vocab} entries",
            tokenizer.name()
        ))),
        _ => Ok(()),
    }
}

/// Holds the `Decoding` phase for the lifetime of one generation.
struct DecodingGuard<'a>(&'a AtomicBool);

impl<'a> DecodingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for DecodingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use agrilm_common::SamplingStrategy;
    use agrilm_core::{ModelConfig, CONFIG_FILE, WEIGHTS_FILE};
    use agrilm_tokenizer::FallbackTokenizer;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};
    use std::sync::Arc;

    fn greedy_config() -> RuntimeConfig {
        RuntimeConfig {
            strategy: SamplingStrategy::Greedy,
            ..Default::default()
        }
    }

    fn session_with(model: ScriptedModel) -> InferenceSession {
        let session = InferenceSession::new(greedy_config());
        session
            .install(Box::new(model), Box::new(FallbackTokenizer::new()))
            .unwrap();
        session
    }

    #[test]
    fn generate_without_model_fails() {
        let session = InferenceSession::default();
        assert_eq!(session.phase(), SessionPhase::Idle);
        let err = session.generate("hello", 10).unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_LOADED");
    }

    #[test]
    fn generates_and_collapses_repeats() {
        // The, farm, is ×3, eos
        let session = session_with(ScriptedModel::new(vec![1000, 1001, 1002, 1002, 1002, 1]));
        assert_eq!(session.phase(), SessionPhase::Ready);

        let out = session.generate("how should", 20).unwrap();
        assert_eq!(out.text, "The farm is is");
        assert_eq!(out.tokens, vec![1000, 1001, 1002, 1002]);
        assert_eq!(out.prompt_tokens, 3);
        assert_eq!(out.stop_reason, StopReason::EndOfSequence { token: 1 });
        assert_eq!(session.phase(), SessionPhase::Ready);

        let metrics = session.metrics();
        assert!(metrics.model_loaded);
        assert_eq!(metrics.last_generated_tokens, 5);
        assert_eq!(metrics.max_sequence_length, 128);
        assert_eq!(metrics.backend, "cpu");
    }

    #[test]
    fn missing_output_gives_empty_text_not_error() {
        let session = session_with(ScriptedModel::new(vec![1000]).with_output_name("hidden_states"));
        let out = session.generate("soil", 10).unwrap();
        assert!(out.is_empty());
        assert!(matches!(out.stop_reason, StopReason::OutputNotFound { .. }));
    }

    #[test]
    fn cancellation_is_observed() {
        let session = session_with(ScriptedModel::repeating(1005));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let out = session.generate_with_cancel("soil", 10, &cancel).unwrap();
        assert_eq!(out.stop_reason, StopReason::Cancelled);
        assert!(out.tokens.is_empty());
    }

    #[test]
    fn failed_load_keeps_previous_model() {
        let session = session_with(ScriptedModel::repeating(1005));
        let err = session
            .load(&InitRequest::new("/definitely/not/here"))
            .unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_FOUND");
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(session.generate("soil", 2).is_ok());

        let idle = InferenceSession::default();
        assert!(idle.load(&InitRequest::new("/definitely/not/here")).is_err());
        assert_eq!(idle.phase(), SessionPhase::Idle);
    }

    #[test]
    fn clear_cache_and_dispose() {
        let session = session_with(ScriptedModel::repeating(1005));
        session.generate("soil", 3).unwrap();
        assert_eq!(session.metrics().last_generated_tokens, 3);

        session.clear_cache();
        assert_eq!(session.metrics().last_generated_tokens, 0);
        assert!(session.is_loaded());

        session.dispose();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.metrics().model_loaded);
        assert_eq!(session.generate("soil", 3).unwrap_err().code(), "MODEL_NOT_LOADED");
    }

    #[test]
    fn unload_waits_for_running_generation() {
        let session = Arc::new(session_with(
            ScriptedModel::repeating(1005).with_delay(Duration::from_millis(20)),
        ));
        let worker = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || session.generate("soil", 5))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.phase() != SessionPhase::Decoding && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        session.unload();

        let out = worker.join().unwrap().unwrap();
        assert_eq!(out.stop_reason, StopReason::StepBudget);
        assert_eq!(out.tokens, vec![1005, 1005]);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    fn tiny_config(vocab_size: usize, max_seq_len: usize) -> ModelConfig {
        ModelConfig {
            vocab_size,
            hidden_size: 16,
            num_heads: 2,
            num_layers: 1,
            intermediate_size: 32,
            max_seq_len,
            ..Default::default()
        }
    }

    /// Random-weight model saved as `config.json` + `model.safetensors`.
    fn write_model(dir: &Path, config: &ModelConfig) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        CausalLm::new(vb, config).unwrap();
        varmap.save(dir.join(WEIGHTS_FILE)).unwrap();
        config.save(&dir.join(CONFIG_FILE)).unwrap();
    }

    fn cpu_request(path: &Path) -> InitRequest {
        let mut request = InitRequest::new(path);
        request.compute = ComputeBackend::Cpu;
        request
    }

    #[test]
    fn rejects_model_with_short_context() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), &tiny_config(3100, 16));

        let session = InferenceSession::default();
        let err = session.load(&cpu_request(dir.path())).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("positions"));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn rejects_tokenizer_ids_beyond_model_vocab() {
        // No tokenizer asset in the directory: the fallback table (ids up
        // to 3009) is chosen, which a 64-entry model cannot score.
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), &tiny_config(64, 128));

        let session = InferenceSession::default();
        let err = session.load(&cpu_request(dir.path())).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("3009"), "{err}");
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.metrics().model_loaded);
    }

    #[test]
    fn install_checks_vocab_too() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = CausalLm::new(vb, &tiny_config(64, 128)).unwrap();

        let session = InferenceSession::default();
        let err = session
            .install(Box::new(model), Box::new(FallbackTokenizer::new()))
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn loads_causal_lm_from_disk_and_generates() {
        let dir = tempfile::tempdir().unwrap();
        write_model(dir.path(), &tiny_config(3100, 128));

        let session = InferenceSession::new(greedy_config());
        session.load(&cpu_request(dir.path())).unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);

        let out = session.generate("The farm", 4).unwrap();
        assert!(out.tokens.len() <= 4);
        assert!(session.metrics().model_loaded);

        let info = session.model_info();
        assert!(info.loaded);
        assert!(info.exists);
        assert_eq!(info.model_path.as_deref(), Some(dir.path()));
        assert_eq!(info.vocab_size, Some(3100));
        assert_eq!(info.tokenizer.as_deref(), Some("fallback"));
        assert!(info.configuration.contains("vocab=3100"));

        let processed = session.process_tokens(&[2, 1000]).unwrap().unwrap();
        assert_eq!(processed.output, "logits");
        assert_eq!(processed.shape, vec![1, 128, 3100]);
        assert_eq!(processed.logits.len(), 3100);
    }

    #[test]
    fn overrides_apply_to_one_call_only() {
        let session = session_with(ScriptedModel::new(vec![1005, 1006, 1]));
        // The scripted logit dominates, so a 0.5 nucleus holds only it.
        let overrides = SamplingOverrides {
            temperature: Some(1.0),
            top_p: Some(0.5),
        };
        let out = session
            .generate_with("soil", 10, overrides, &CancelFlag::new())
            .unwrap();
        assert_eq!(out.text, "soil water");

        let state = session.state.lock();
        let sampler = state.as_ref().unwrap().sampler.config();
        assert_eq!(sampler.strategy, SamplingStrategy::Greedy);
        assert_eq!(sampler.top_p, 1.0);
    }

    #[test]
    fn bad_override_is_invalid_argument() {
        let session = session_with(ScriptedModel::repeating(1005));
        let overrides = SamplingOverrides {
            temperature: None,
            top_p: Some(2.0),
        };
        let err = session
            .generate_with("soil", 3, overrides, &CancelFlag::new())
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGS");
        assert_eq!(session.metrics().last_generated_tokens, 0);
    }

    #[test]
    fn process_tokens_returns_next_token_row() {
        let session = session_with(ScriptedModel::new(vec![1005]));
        let processed = session.process_tokens(&[2, 1010]).unwrap().unwrap();
        assert_eq!(processed.output, "logits");
        assert_eq!(processed.shape, vec![1, 128, 4096]);
        assert_eq!(crate::sampler::argmax(&processed.logits), 1005);
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[test]
    fn process_tokens_argument_errors() {
        let idle = InferenceSession::default();
        assert_eq!(idle.process_tokens(&[2]).unwrap_err().code(), "MODEL_NOT_LOADED");

        let session = session_with(ScriptedModel::repeating(1005));
        assert_eq!(session.process_tokens(&[]).unwrap_err().code(), "INVALID_ARGS");
        assert_eq!(session.process_tokens(&[2, 4096]).unwrap_err().code(), "INVALID_ARGS");

        let hidden = session_with(ScriptedModel::repeating(1005).with_output_name("hidden"));
        assert_eq!(hidden.process_tokens(&[2]).unwrap(), None);
    }

    #[test]
    fn process_batch_maps_failures_to_none() {
        let session = session_with(ScriptedModel::repeating(1005));
        let results = session.process_batch(&[vec![2, 1010], vec![], vec![9999], vec![2]]);
        assert_eq!(results.len(), 4);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert!(results[2].is_none());
        assert!(results[3].is_some());
    }

    #[test]
    fn model_info_when_idle_and_installed() {
        let idle = InferenceSession::default().model_info();
        assert!(!idle.loaded);
        assert_eq!(idle.configuration, "Not loaded");
        assert_eq!(idle.model_path, None);

        let session = session_with(ScriptedModel::repeating(1005));
        let info = session.model_info();
        assert!(info.loaded);
        assert!(!info.exists);
        assert_eq!(info.vocab_size, Some(4096));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["modelPath"], serde_json::Value::Null);
        assert_eq!(json["vocabSize"], 4096);
    }
}
