//! # agrilm-core
//!
//! The model side of the engine:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`outputs`] | `LanguageModel` trait, `ModelOutputs` named-tensor map |
//! | [`config`] | `ModelConfig` (serde, `config.json`) |
//! | [`attention`] | `CausalSelfAttention` |
//! | [`model`] | `CausalLm`, the candle transformer behind `LanguageModel` |
//! | [`device`] | compute-backend preference → `candle_core::Device` |

pub mod attention;
pub mod config;
pub mod device;
pub mod model;
pub mod outputs;

// ── Public re-exports ───────────────────────────────────────────────────────

pub use config::ModelConfig;
pub use device::{device_label, select_device};
pub use model::{model_files, CausalLm, CONFIG_FILE, WEIGHTS_FILE};
pub use outputs::{LanguageModel, ModelOutputs};
