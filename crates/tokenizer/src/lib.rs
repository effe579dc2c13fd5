//! # agrilm-tokenizer — Vocabulary-Table Tokenizers
//!
//! Text ↔ token-id conversion for the on-device generation core.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`vocab`] | `Vocabulary` (bidirectional table), `SpecialTokens` and its id mapping |
//! | [`codec`] | Shared encode/decode rules (`▁` word-boundary convention, subword scan) |
//! | [`json`] | `JsonVocabTokenizer` — `tokenizer.json` `model.vocab` tables |
//! | [`sentencepiece`] | `SentencePieceTokenizer` — piece table read from a `.model` protobuf |
//! | [`fallback`] | `FallbackTokenizer` — small hardcoded table, always available |
//! | [`loader`] | `TokenizerLoader` — ordered backend selection |
//!
//! All backends share one special-token convention (`pad=0, eos=1, bos=2,
//! unk=3`) and map each vocabulary onto it through [`SpecialTokens::resolve`].

pub mod codec;
pub mod error;
pub mod fallback;
pub mod json;
pub mod loader;
pub mod sentencepiece;
pub mod vocab;

pub use error::TokenizerError;
pub use fallback::FallbackTokenizer;
pub use json::JsonVocabTokenizer;
pub use loader::{TokenizerLoader, MIN_VOCAB_TOKENS};
pub use sentencepiece::SentencePieceTokenizer;
pub use vocab::{SpecialTokens, Vocabulary, WORD_BOUNDARY};

/// Common interface over the tokenizer backends.
pub trait Tokenizer: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Text → ids. Always starts with `bos`.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Ids → text. Special and unknown ids are skipped.
    fn decode(&self, ids: &[u32]) -> String;

    fn vocab_size(&self) -> usize;

    /// Largest id `encode` can emit; a model must accept every id up to it.
    fn max_id(&self) -> Option<u32>;

    fn special_tokens(&self) -> SpecialTokens;
}
