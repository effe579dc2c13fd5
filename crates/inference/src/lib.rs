//! # agrilm-infer — Generation Runtime
//!
//! * **[`sampler`]** — arg-max, temperature and top-p sampling.
//! * **[`window`]** / **[`logits`]** — fixed context window, logits lookup by output name.
//! * **[`decode`]** — the step loop with eos/pad, budget and cancellation stops.
//! * **[`postprocess`]** — repeat collapsing.
//! * **[`prompt`]** — system prompt + history chat layout.
//! * **[`session`]** — `InferenceSession`, the lock-guarded resident model.
//! * **[`bridge`]** — typed host API and the JSON method channel.

pub mod bridge;
pub mod decode;
pub mod logits;
pub mod metrics;
pub mod postprocess;
pub mod prompt;
pub mod sampler;
pub mod session;
pub mod window;

#[cfg(test)]
mod testing;

pub use bridge::{GenerationHandle, InferenceBridge, MethodCall, MethodError, MethodResponse};
pub use decode::{decode_loop, CancelFlag, DecodeOutcome, DecodeParams, StopReason};
pub use logits::{logits_at, LogitsResolver, LogitsShape};
pub use metrics::PerformanceMetrics;
pub use postprocess::collapse_repeats;
pub use prompt::{build_chat_prompt, ChatTurn};
pub use sampler::{Sampler, SamplerConfig, SamplingOverrides};
pub use session::{
    GenerationOutput, InferenceSession, InitRequest, ModelInfo, ProcessedTokens, SessionPhase,
};
