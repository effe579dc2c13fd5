//! # agrilm-common — Shared Primitives
//!
//! Types shared by every crate in the workspace:
//!
//! * **[`RuntimeConfig`]** — decoding and loading knobs (serialised as JSON).
//! * **[`ComputeBackend`]** — compute-device preference from the host app.
//! * **[`EngineError`]** — error taxonomy with machine-readable codes.

pub mod config;
pub mod error;

pub use config::{ComputeBackend, RuntimeConfig, SamplingStrategy, DEFAULT_SYSTEM_PROMPT};
pub use error::{EngineError, Result};
