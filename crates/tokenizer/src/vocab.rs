//! Vocabulary table and the special-token convention.

use std::collections::HashMap;

/// SentencePiece word-boundary marker: the piece was preceded by a space.
pub const WORD_BOUNDARY: char = '▁';

/// Bidirectional token ↔ id table. Built once, read-only afterwards.
///
/// Inserting an id that is already mapped silently replaces the reverse entry;
/// the last insert wins.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: HashMap<u32, String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            token_to_id: HashMap::with_capacity(capacity),
            id_to_token: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, token: impl Into<String>, id: u32) {
        let token = token.into();
        self.id_to_token.insert(id, token.clone());
        self.token_to_id.insert(token, id);
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    /// Number of distinct token strings.
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    /// Highest id in the table; the model's vocabulary must cover it.
    pub fn max_id(&self) -> Option<u32> {
        self.id_to_token.keys().copied().max()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for Vocabulary {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        let mut vocab = Vocabulary::new();
        for (token, id) in iter {
            vocab.insert(token, id);
        }
        vocab
    }
}

// ── Special tokens ──────────────────────────────────────────────────────────

/// Reserved ids.
///
/// The canonical layout is `pad=0, eos=1, bos=2, unk=3`. Backends do not
/// hardcode their own layout; they call [`SpecialTokens::resolve`] which
/// starts from the canonical layout and overrides each id with the one the
/// vocabulary actually assigns to a known spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: u32,
    pub bos: u32,
    pub eos: u32,
    pub unk: u32,
}

const PAD_SPELLINGS: &[&str] = &["<pad>"];
const BOS_SPELLINGS: &[&str] = &["<bos>", "<s>"];
const EOS_SPELLINGS: &[&str] = &["<eos>", "</s>", "<|endoftext|>"];
const UNK_SPELLINGS: &[&str] = &["<unk>"];

impl Default for SpecialTokens {
    fn default() -> Self {
        Self::CANONICAL
    }
}

impl SpecialTokens {
    pub const CANONICAL: SpecialTokens = SpecialTokens {
        pad: 0,
        eos: 1,
        bos: 2,
        unk: 3,
    };

    /// Map a vocabulary onto the canonical convention.
    pub fn resolve(vocab: &Vocabulary) -> Self {
        let lookup = |spellings: &[&str], fallback: u32| {
            spellings
                .iter()
                .find_map(|s| vocab.id(s))
                .unwrap_or(fallback)
        };
        let canonical = Self::CANONICAL;
        Self {
            pad: lookup(PAD_SPELLINGS, canonical.pad),
            bos: lookup(BOS_SPELLINGS, canonical.bos),
            eos: lookup(EOS_SPELLINGS, canonical.eos),
            unk: lookup(UNK_SPELLINGS, canonical.unk),
        }
    }

    pub fn is_special(&self, id: u32) -> bool {
        id == self.pad || id == self.bos || id == self.eos || id == self.unk
    }

    /// True for ids that end decoding.
    pub fn is_stop(&self, id: u32) -> bool {
        id == self.eos || id == self.pad
    }
}
