//! Encode/decode rules shared by every backend.
//!
//! Words are whitespace-delimited. A word preceded by whitespace is looked up
//! with the `▁` marker first; the first word of unpadded text is looked up
//! bare first. Misses fall back to a greedy longest-prefix subword scan.

use crate::vocab::{SpecialTokens, Vocabulary, WORD_BOUNDARY};

pub fn encode(vocab: &Vocabulary, specials: &SpecialTokens, text: &str) -> Vec<u32> {
    let mut ids = vec![specials.bos];
    let leading_space = text.starts_with(char::is_whitespace);

    for (index, word) in text.split_whitespace().enumerate() {
        let marked = index > 0 || leading_space;
        let with_marker = format!("{WORD_BOUNDARY}{word}");
        let (primary, secondary) = if marked {
            (with_marker.as_str(), word)
        } else {
            (word, with_marker.as_str())
        };

        match lookup_word(vocab, primary).or_else(|| lookup_word(vocab, secondary)) {
            Some(id) => ids.push(id),
            None => subword_scan(vocab, specials.unk, primary, &mut ids),
        }
    }
    ids
}

fn lookup_word(vocab: &Vocabulary, word: &str) -> Option<u32> {
    vocab.id(word).or_else(|| vocab.id(&word.to_lowercase()))
}

/// Greedy longest-prefix match; unmatched chars become `unk`.
fn subword_scan(vocab: &Vocabulary, unk: u32, word: &str, out: &mut Vec<u32>) {
    let mut rest = word;
    while !rest.is_empty() {
        let matched = rest
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .rev()
            .find_map(|end| vocab.id(&rest[..end]).map(|id| (id, end)));

        match matched {
            Some((id, end)) => {
                out.push(id);
                rest = &rest[end..];
            }
            None => {
                out.push(unk);
                let step = rest.chars().next().map_or(rest.len(), char::len_utf8);
                rest = &rest[step..];
            }
        }
    }
}

pub fn decode(vocab: &Vocabulary, specials: &SpecialTokens, ids: &[u32]) -> String {
    let mut text = String::new();
    for &id in ids {
        if specials.is_special(id) {
            continue;
        }
        let Some(piece) = vocab.token(id) else {
            continue;
        };
        if is_bracketed(piece) {
            continue;
        }
        match piece.strip_prefix(WORD_BOUNDARY) {
            Some(word) => {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.extend(word.chars().map(|c| if c == WORD_BOUNDARY { ' ' } else { c }));
            }
            None => text.push_str(piece),
        }
    }
    text.trim().to_string()
}

/// `<pad>`, `<0x0A>`, `<start_of_turn>` and friends.
fn is_bracketed(piece: &str) -> bool {
    piece.len() > 2 && piece.starts_with('<') && piece.ends_with('>')
}
