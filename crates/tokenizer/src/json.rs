//! Tokenizer backed by the `model.vocab` table of a `tokenizer.json` file.
//!
//! Two table shapes are accepted:
//!
//! * object `{"piece": id, ...}` (BPE / WordPiece exports),
//! * array `[["piece", score], ...]` (Unigram exports; id = position).
//!
//! Entries from the top-level `added_tokens` list are merged on top.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::codec;
use crate::error::TokenizerError;
use crate::vocab::{SpecialTokens, Vocabulary};
use crate::Tokenizer;

#[derive(Deserialize)]
struct TokenizerFile {
    model: ModelSection,
    #[serde(default)]
    added_tokens: Vec<AddedToken>,
}

#[derive(Deserialize)]
struct ModelSection {
    vocab: VocabTable,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VocabTable {
    // BTreeMap keeps construction order deterministic (key-sorted).
    Map(BTreeMap<String, u32>),
    Scored(Vec<(String, f64)>),
}

#[derive(Deserialize)]
struct AddedToken {
    id: u32,
    content: String,
}

pub struct JsonVocabTokenizer {
    vocab: Vocabulary,
    specials: SpecialTokens,
}

impl JsonVocabTokenizer {
    pub fn from_file(path: &Path, min_tokens: usize) -> Result<Self, TokenizerError> {
        let reader = BufReader::new(File::open(path)?);
        let file: TokenizerFile = serde_json::from_reader(reader)?;
        Self::from_parsed(file, min_tokens)
    }

    pub fn from_json_str(json: &str, min_tokens: usize) -> Result<Self, TokenizerError> {
        let file: TokenizerFile = serde_json::from_str(json)?;
        Self::from_parsed(file, min_tokens)
    }

    fn from_parsed(file: TokenizerFile, min_tokens: usize) -> Result<Self, TokenizerError> {
        let mut vocab = match file.model.vocab {
            VocabTable::Map(map) => map.into_iter().collect::<Vocabulary>(),
            VocabTable::Scored(pieces) => {
                let mut vocab = Vocabulary::with_capacity(pieces.len());
                for (id, (piece, _score)) in pieces.into_iter().enumerate() {
                    let id = u32::try_from(id).map_err(|_| {
                        TokenizerError::Malformed("vocabulary exceeds u32 ids".into())
                    })?;
                    vocab.insert(piece, id);
                }
                vocab
            }
        };
        for added in file.added_tokens {
            vocab.insert(added.content, added.id);
        }

        if vocab.len() < min_tokens {
            return Err(TokenizerError::TooFewTokens {
                found: vocab.len(),
                min: min_tokens,
            });
        }

        let specials = SpecialTokens::resolve(&vocab);
        tracing::info!(
            tokens = vocab.len(),
            bos = specials.bos,
            eos = specials.eos,
            "loaded JSON vocabulary"
        );
        Ok(Self { vocab, specials })
    }
}

impl Tokenizer for JsonVocabTokenizer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        codec::encode(&self.vocab, &self.specials, text)
    }

    fn decode(&self, ids: &[u32]) -> String {
        codec::decode(&self.vocab, &self.specials, ids)
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn max_id(&self) -> Option<u32> {
        self.vocab.max_id()
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.specials
    }
}
