//! Host-facing surface: typed calls plus a JSON method channel.
//!
//! Method names and argument keys follow the mobile plugin the engine is
//! embedded in (`initializeModel`, `generateText`, `chat`, `getModelInfo`,
//! `processTokens`, `processBatch`, `getPerformanceMetrics`, `clearCache`,
//! `dispose`).

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use agrilm_common::{ComputeBackend, EngineError, Result, RuntimeConfig};

use crate::decode::CancelFlag;
use crate::metrics::PerformanceMetrics;
use crate::prompt::{build_chat_prompt, ChatTurn};
use crate::sampler::SamplingOverrides;
use crate::session::{InferenceSession, InitRequest, ModelInfo, ProcessedTokens};

pub struct InferenceBridge {
    session: Arc<InferenceSession>,
}

impl InferenceBridge {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::from_session(Arc::new(InferenceSession::new(config)))
    }

    pub fn from_session(session: Arc<InferenceSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<InferenceSession> {
        &self.session
    }

    pub fn initialize_model(&self, request: &InitRequest) -> Result<bool> {
        self.session.load(request)?;
        Ok(true)
    }

    /// Generate with `max_new_tokens` or the configured default (50).
    pub fn generate_text(&self, prompt: &str, max_new_tokens: Option<usize>) -> Result<String> {
        self.generate_text_with(prompt, max_new_tokens, SamplingOverrides::default())
    }

    pub fn generate_text_with(
        &self,
        prompt: &str,
        max_new_tokens: Option<usize>,
        overrides: SamplingOverrides,
    ) -> Result<String> {
        let max = max_new_tokens.unwrap_or(self.session.config().default_max_new_tokens);
        let out = self
            .session
            .generate_with(prompt, max, overrides, &CancelFlag::new())?;
        Ok(out.text)
    }

    /// Answer `message` in the context of `history`.
    ///
    /// `system_prompt` falls back to the configured one.
    pub fn chat(
        &self,
        message: &str,
        history: &[ChatTurn],
        system_prompt: Option<&str>,
        max_new_tokens: Option<usize>,
        overrides: SamplingOverrides,
    ) -> Result<String> {
        let system = system_prompt.unwrap_or(self.session.config().system_prompt.as_str());
        let prompt = build_chat_prompt(system, history, message);
        self.generate_text_with(&prompt, max_new_tokens, overrides)
    }

    pub fn model_info(&self) -> ModelInfo {
        self.session.model_info()
    }

    pub fn process_tokens(&self, ids: &[u32]) -> Result<Option<ProcessedTokens>> {
        self.session.process_tokens(ids)
    }

    pub fn process_batch(&self, batches: &[Vec<u32>]) -> Vec<Option<ProcessedTokens>> {
        self.session.process_batch(batches)
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.session.metrics()
    }

    pub fn clear_cache(&self) {
        self.session.clear_cache();
    }

    pub fn dispose(&self) {
        self.session.dispose();
    }

    /// Run a generation on a worker thread and hand the result to `callback`.
    pub fn generate_text_async<F>(
        &self,
        prompt: String,
        max_new_tokens: Option<usize>,
        callback: F,
    ) -> Result<GenerationHandle>
    where
        F: FnOnce(Result<String>) + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        let max = max_new_tokens.unwrap_or(session.config().default_max_new_tokens);
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("agrilm-generate".into())
            .spawn(move || {
                let result = session
                    .generate_with_cancel(&prompt, max, &flag)
                    .map(|out| out.text);
                callback(result);
            })?;
        Ok(GenerationHandle { cancel, thread })
    }

    /// Dispatch one method-channel call.
    pub fn handle(&self, call: &MethodCall) -> MethodResponse {
        tracing::debug!(method = %call.method, "method call");
        match call.method.as_str() {
            "initializeModel" => {
                let args: InitializeArgs = match parse_args(&call.arguments) {
                    Ok(args) => args,
                    Err(resp) => return resp,
                };
                match self.initialize_model(&args.into_request()) {
                    Ok(loaded) => MethodResponse::Ok(json!(loaded)),
                    Err(e) => MethodResponse::from_error(&e),
                }
            }
            "generateText" => {
                let args: GenerateArgs = match parse_args(&call.arguments) {
                    Ok(args) => args,
                    Err(resp) => return resp,
                };
                let overrides = args.overrides();
                let result = if args.system_prompt.is_some() || !args.history.is_empty() {
                    self.chat(
                        &args.prompt,
                        &args.history,
                        args.system_prompt.as_deref(),
                        args.max_tokens,
                        overrides,
                    )
                } else {
                    self.generate_text_with(&args.prompt, args.max_tokens, overrides)
                };
                match result {
                    Ok(text) => MethodResponse::Ok(json!(text)),
                    Err(e) => MethodResponse::generation_error(&e),
                }
            }
            "chat" => {
                let args: ChatArgs = match parse_args(&call.arguments) {
                    Ok(args) => args,
                    Err(resp) => return resp,
                };
                let overrides = SamplingOverrides {
                    temperature: args.temperature,
                    top_p: args.top_p,
                };
                match self.chat(
                    &args.message,
                    &args.history,
                    args.system_prompt.as_deref(),
                    args.max_tokens,
                    overrides,
                ) {
                    Ok(text) => MethodResponse::Ok(json!(text)),
                    Err(e) => MethodResponse::generation_error(&e),
                }
            }
            "getModelInfo" => to_response(&self.model_info()),
            "processTokens" => {
                let args: ProcessTokensArgs = match parse_args(&call.arguments) {
                    Ok(args) => args,
                    Err(resp) => return resp,
                };
                match self.process_tokens(&args.token_ids) {
                    Ok(Some(processed)) => to_response(&processed),
                    Ok(None) => MethodResponse::error(
                        "INFERENCE_ERROR",
                        "no logits output among the model's outputs",
                    ),
                    Err(e) => MethodResponse::from_error(&e),
                }
            }
            "processBatch" => {
                let args: ProcessBatchArgs = match parse_args(&call.arguments) {
                    Ok(args) => args,
                    Err(resp) => return resp,
                };
                to_response(&self.process_batch(&args.token_batches))
            }
            "getPerformanceMetrics" | "getPerformanceStats" => {
                to_response(&self.performance_metrics())
            }
            "clearCache" => {
                self.clear_cache();
                MethodResponse::Ok(Value::Null)
            }
            "dispose" => {
                self.dispose();
                MethodResponse::Ok(Value::Null)
            }
            other => MethodResponse::error("NOT_IMPLEMENTED", format!("unknown method '{other}'")),
        }
    }
}

/// A background generation started by [`InferenceBridge::generate_text_async`].
pub struct GenerationHandle {
    cancel: CancelFlag,
    thread: JoinHandle<()>,
}

impl GenerationHandle {
    /// Ask the worker to stop before its next decoding step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker; `Err` carries its panic payload.
    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }
}

// ── Method channel ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Serialises as `{"ok": value}` or `{"error": {"code", "message"}}`, with an
/// optional `details` object inside `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodResponse {
    Ok(Value),
    Error(MethodError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl MethodResponse {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error(MethodError {
            code: code.to_string(),
            message: message.into(),
            details: None,
        })
    }

    pub fn from_error(err: &EngineError) -> Self {
        Self::error(err.code(), err.to_string())
    }

    /// `GENERATION_ERROR`, with the underlying code under `details.code`.
    pub fn generation_error(err: &EngineError) -> Self {
        Self::Error(MethodError {
            code: "GENERATION_ERROR".to_string(),
            message: err.to_string(),
            details: Some(json!({ "code": err.code() })),
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeArgs {
    model_path: PathBuf,
    #[serde(default)]
    tokenizer_path: Option<PathBuf>,
    #[serde(default)]
    compute_units: Option<String>,
}

impl InitializeArgs {
    fn into_request(self) -> InitRequest {
        InitRequest {
            model_path: self.model_path,
            tokenizer_path: self.tokenizer_path,
            compute: self
                .compute_units
                .as_deref()
                .map(ComputeBackend::parse_lenient)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateArgs {
    prompt: String,
    #[serde(default)]
    max_tokens: Option<usize>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    top_p: Option<f32>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

impl GenerateArgs {
    fn overrides(&self) -> SamplingOverrides {
        SamplingOverrides {
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatArgs {
    message: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    max_tokens: Option<usize>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessTokensArgs {
    token_ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessBatchArgs {
    token_batches: Vec<Vec<u32>>,
}

fn parse_args<T: serde::de::DeserializeOwned>(
    arguments: &Value,
) -> std::result::Result<T, MethodResponse> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| MethodResponse::from_error(&EngineError::InvalidArgument(e.to_string())))
}

fn to_response<T: Serialize>(value: &T) -> MethodResponse {
    match serde_json::to_value(value) {
        Ok(value) => MethodResponse::Ok(value),
        Err(e) => MethodResponse::from_error(&EngineError::from(e)),
    }
}
