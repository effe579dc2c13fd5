//! Ordered backend selection.
//!
//! JSON table → SentencePiece piece table → hardcoded fallback. The first
//! backend that constructs wins; later ones are never built. Failures are
//! logged and demoted, never returned.

use std::path::{Path, PathBuf};

use crate::error::TokenizerError;
use crate::fallback::FallbackTokenizer;
use crate::json::JsonVocabTokenizer;
use crate::sentencepiece::SentencePieceTokenizer;
use crate::Tokenizer;

/// File-backed vocabularies smaller than this are treated as parse failures.
pub const MIN_VOCAB_TOKENS: usize = 100;

#[derive(Debug, Clone)]
pub struct TokenizerLoader {
    pub json: Option<PathBuf>,
    pub sentencepiece: Option<PathBuf>,
    pub min_tokens: usize,
}

impl Default for TokenizerLoader {
    fn default() -> Self {
        Self {
            json: None,
            sentencepiece: None,
            min_tokens: MIN_VOCAB_TOKENS,
        }
    }
}

impl TokenizerLoader {
    /// Pick up `tokenizer.json` / `tokenizer.model` from a model directory.
    pub fn discover(dir: &Path) -> Self {
        let existing = |name: &str| Some(dir.join(name)).filter(|p| p.is_file());
        Self {
            json: existing("tokenizer.json"),
            sentencepiece: existing("tokenizer.model"),
            ..Default::default()
        }
    }

    /// Route one explicit asset to its slot by extension.
    pub fn for_path(path: &Path) -> Self {
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let path = Some(path.to_path_buf());
        if is_json {
            Self {
                json: path,
                ..Default::default()
            }
        } else {
            Self {
                sentencepiece: path,
                ..Default::default()
            }
        }
    }

    pub fn with_min_tokens(mut self, min_tokens: usize) -> Self {
        self.min_tokens = min_tokens;
        self
    }

    pub fn load(&self) -> Box<dyn Tokenizer> {
        if let Some(path) = &self.json {
            match JsonVocabTokenizer::from_file(path, self.min_tokens) {
                Ok(tok) => return selected(Box::new(tok), path),
                Err(e) => demoted("json", path, &e),
            }
        }
        if let Some(path) = &self.sentencepiece {
            match SentencePieceTokenizer::from_model_file(path, self.min_tokens) {
                Ok(tok) => return selected(Box::new(tok), path),
                Err(e) => demoted("sentencepiece", path, &e),
            }
        }
        tracing::warn!("no tokenizer asset usable, using the built-in fallback vocabulary");
        Box::new(FallbackTokenizer::new())
    }
}

fn selected(tok: Box<dyn Tokenizer>, path: &Path) -> Box<dyn Tokenizer> {
    tracing::info!(
        backend = tok.name(),
        vocab = tok.vocab_size(),
        path = %path.display(),
        "tokenizer selected"
    );
    tok
}

fn demoted(backend: &str, path: &Path, err: &TokenizerError) {
    tracing::warn!(backend, path = %path.display(), error = %err, "tokenizer backend rejected");
}
