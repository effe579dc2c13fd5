//! Minimal hardcoded vocabulary used when no tokenizer asset can be read.
//!
//! Covers the canonical special tokens, a farming-domain word list, common
//! English question words, a few Japanese farming terms, suffixes and
//! punctuation. Enough to keep the pipeline alive; not a real tokenizer.

use crate::codec;
use crate::vocab::{SpecialTokens, Vocabulary};
use crate::Tokenizer;

const SPECIALS: &[(&str, u32)] = &[("<pad>", 0), ("<eos>", 1), ("<bos>", 2), ("<unk>", 3)];

const SUBWORDS: &[(&str, u32)] = &[
    ("ing", 200),
    ("ed", 201),
    ("er", 202),
    ("est", 203),
    ("ly", 204),
    ("s", 205),
    (".", 300),
    (",", 301),
    ("!", 302),
    ("?", 303),
];

const FARM_WORDS: &[&str] = &[
    "▁The", "▁farm", "▁is", "▁growing", "▁well", "▁soil", "▁water", "▁plant", "▁leaf",
    "▁yellow", "▁green", "▁disease", "▁pest", "▁fertilizer", "▁harvest", "▁weather",
    "▁temperature", "▁moisture", "▁irrigation", "▁crop", "▁field",
];

const QUESTION_WORDS: &[&str] = &[
    "▁what", "▁how", "▁when", "▁where", "▁why", "▁can", "▁should", "▁will", "▁need",
    "▁want",
];

const JAPANESE_WORDS: &[&str] = &[
    "▁農業", "▁作物", "▁野菜", "▁田んぼ", "▁畑", "▁収穫", "▁肥料", "▁水やり", "▁病気",
    "▁害虫",
];

pub struct FallbackTokenizer {
    vocab: Vocabulary,
    specials: SpecialTokens,
}

impl FallbackTokenizer {
    pub fn new() -> Self {
        let mut vocab = Vocabulary::new();
        for &(token, id) in SPECIALS.iter().chain(SUBWORDS) {
            vocab.insert(token, id);
        }
        for (base, words) in [(1000u32, FARM_WORDS), (2000, QUESTION_WORDS), (3000, JAPANESE_WORDS)] {
            for (offset, word) in (0u32..).zip(words.iter()) {
                vocab.insert(*word, base + offset);
            }
        }
        let specials = SpecialTokens::resolve(&vocab);
        Self { vocab, specials }
    }
}

impl Default for FallbackTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for FallbackTokenizer {
    fn name(&self) -> &'static str {
        "fallback"
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
