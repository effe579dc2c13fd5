//! Tokenizer backed by the piece table of a SentencePiece `.model` file.
//!
//! The file is a serialised `ModelProto`. Only the repeated `pieces` field
//! (field 1) is read; trainer and normaliser specs are skipped. Each piece is
//! a nested message whose field 1 is the piece text and field 3 its type.
//! Ids are positions in the piece list.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::codec;
use crate::error::TokenizerError;
use crate::vocab::{SpecialTokens, Vocabulary};
use crate::Tokenizer;

const FIELD_PIECES: u64 = 1;
const FIELD_PIECE_TEXT: u64 = 1;
const FIELD_PIECE_TYPE: u64 = 3;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// `SentencePiece.Type` values that matter here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PieceType {
    Normal,
    Unknown,
    Other,
}

impl PieceType {
    fn from_raw(raw: u64) -> Self {
        match raw {
            1 => Self::Normal,
            2 => Self::Unknown,
            _ => Self::Other,
        }
    }
}

pub struct SentencePieceTokenizer {
    vocab: Vocabulary,
    specials: SpecialTokens,
}

impl SentencePieceTokenizer {
    pub fn from_model_file(path: &Path, min_tokens: usize) -> Result<Self, TokenizerError> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(TokenizerError::Malformed("empty model file".into()));
        }
        // Read-only mapping of a file we do not modify.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&mmap, min_tokens)
    }

    pub fn from_bytes(bytes: &[u8], min_tokens: usize) -> Result<Self, TokenizerError> {
        let pieces = parse_pieces(bytes)?;
        if pieces.len() < min_tokens {
            return Err(TokenizerError::TooFewTokens {
                found: pieces.len(),
                min: min_tokens,
            });
        }

        let mut vocab = Vocabulary::with_capacity(pieces.len());
        let mut unknown_id = None;
        for (id, (text, kind)) in pieces.into_iter().enumerate() {
            let id = u32::try_from(id)
                .map_err(|_| TokenizerError::Malformed("piece table exceeds u32 ids".into()))?;
            if kind == PieceType::Unknown && unknown_id.is_none() {
                unknown_id = Some(id);
            }
            vocab.insert(text, id);
        }

        let mut specials = SpecialTokens::resolve(&vocab);
        if let Some(unk) = unknown_id {
            specials.unk = unk;
        }
        tracing::info!(
            tokens = vocab.len(),
            bos = specials.bos,
            eos = specials.eos,
            unk = specials.unk,
            "loaded SentencePiece piece table"
        );
        Ok(Self { vocab, specials })
    }
}

impl Tokenizer for SentencePieceTokenizer {
    fn name(&self) -> &'static str {
        "sentencepiece"
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

// ── Protobuf wire walk ──────────────────────────────────────────────────────

fn parse_pieces(bytes: &[u8]) -> Result<Vec<(String, PieceType)>, TokenizerError> {
    let mut reader = WireReader::new(bytes);
    let mut pieces = Vec::new();
    while !reader.is_empty() {
        let (field, wire) = reader.key()?;
        if field == FIELD_PIECES && wire == WIRE_LEN {
            let message = reader.len_delimited()?;
            pieces.push(parse_piece(message)?);
        } else {
            reader.skip(wire)?;
        }
    }
    Ok(pieces)
}

fn parse_piece(bytes: &[u8]) -> Result<(String, PieceType), TokenizerError> {
    let mut reader = WireReader::new(bytes);
    let mut text = None;
    let mut kind = PieceType::Normal;
    while !reader.is_empty() {
        let (field, wire) = reader.key()?;
        match (field, wire) {
            (FIELD_PIECE_TEXT, WIRE_LEN) => {
                let raw = reader.len_delimited()?;
                let piece = std::str::from_utf8(raw)
                    .map_err(|e| TokenizerError::Malformed(format!("piece is not UTF-8: {e}")))?;
                text = Some(piece.to_string());
            }
            (FIELD_PIECE_TYPE, WIRE_VARINT) => kind = PieceType::from_raw(reader.varint()?),
            _ => reader.skip(wire)?,
        }
    }
    let text = text.ok_or_else(|| TokenizerError::Malformed("piece without text".into()))?;
    Ok((text, kind))
}

struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, TokenizerError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| TokenizerError::Malformed("truncated varint".into()))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(TokenizerError::Malformed("varint longer than 10 bytes".into()))
    }

    fn key(&mut self) -> Result<(u64, u8), TokenizerError> {
        let key = self.varint()?;
        Ok((key >> 3, (key & 0x7) as u8))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], TokenizerError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| TokenizerError::Malformed("field runs past end of data".into()))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn len_delimited(&mut self) -> Result<&'a [u8], TokenizerError> {
        let len = usize::try_from(self.varint()?)
            .map_err(|_| TokenizerError::Malformed("length overflows usize".into()))?;
        self.take(len)
    }

    fn skip(&mut self, wire: u8) -> Result<(), TokenizerError> {
        match wire {
            WIRE_VARINT => self.varint().map(|_| ()),
            WIRE_FIXED64 => self.take(8).map(|_| ()),
            WIRE_LEN => self.len_delimited().map(|_| ()),
            WIRE_FIXED32 => self.take(4).map(|_| ()),
            other => Err(TokenizerError::Malformed(format!(
                "unsupported wire type {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(mut v: u64, out: &mut Vec<u8>) {
        while v >= 0x80 {
            out.push((v as u8 & 0x7f) | 0x80);
            v >>= 7;
        }
        out.push(v as u8);
    }

    fn len_field(field: u64, payload: &[u8], out: &mut Vec<u8>) {
        varint(field << 3 | WIRE_LEN as u64, out);
        varint(payload.len() as u64, out);
        out.extend_from_slice(payload);
    }

    fn piece(text: &str, score: f32, kind: u64) -> Vec<u8> {
        let mut msg = Vec::new();
        len_field(FIELD_PIECE_TEXT, text.as_bytes(), &mut msg);
        varint(2 << 3 | WIRE_FIXED32 as u64, &mut msg);
        msg.extend_from_slice(&score.to_le_bytes());
        varint(FIELD_PIECE_TYPE << 3 | WIRE_VARINT as u64, &mut msg);
        varint(kind, &mut msg);
        msg
    }

    /// `<unk> <s> </s>` then `extra` normal pieces, plus unrelated top-level fields.
    fn model_proto(extra: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        len_field(FIELD_PIECES, &piece("<unk>", 0.0, 2), &mut out);
        len_field(FIELD_PIECES, &piece("<s>", 0.0, 3), &mut out);
        len_field(FIELD_PIECES, &piece("</s>", 0.0, 3), &mut out);
        for (i, text) in extra.iter().enumerate() {
            len_field(FIELD_PIECES, &piece(text, -(i as f32), 1), &mut out);
        }
        // trainer_spec (field 2) and a fixed64 field: must be skipped.
        len_field(2, b"\x08\x01", &mut out);
        varint(9 << 3 | WIRE_FIXED64 as u64, &mut out);
        out.extend_from_slice(&[0u8; 8]);
        out
    }

    fn words(n: usize) -> Vec<String> {
        let mut words = vec!["▁farm".to_string(), "▁water".to_string()];
        words.extend((0..n).map(|i| format!("▁w{i}")));
        words
    }

    #[test]
    fn parses_pieces_and_maps_specials() {
        let words = words(100);
        let refs: Vec<&str> = words.iter().map(String::as_str).collect();
        let tok = SentencePieceTokenizer::from_bytes(&model_proto(&refs), 100).unwrap();

        assert_eq!(tok.vocab_size(), 105);
        let specials = tok.special_tokens();
        assert_eq!((specials.unk, specials.bos, specials.eos), (0, 1, 2));
        assert_eq!(tok.encode("farm water"), vec![1, 3, 4]);
        assert_eq!(tok.decode(&[1, 3, 4, 2]), "farm water");
    }

    #[test]
    fn too_few_pieces_is_rejected() {
        let bytes = model_proto(&["▁a", "▁b"]);
        assert!(matches!(
            SentencePieceTokenizer::from_bytes(&bytes, 100),
            Err(TokenizerError::TooFewTokens { found: 5, .. })
        ));
    }

    #[test]
    fn truncated_data_is_malformed() {
        let mut bytes = model_proto(&["▁a"]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            SentencePieceTokenizer::from_bytes(&bytes, 1),
            Err(TokenizerError::Malformed(_))
        ));
    }

    #[test]
    fn arbitrary_text_is_not_a_model() {
        // ASCII '{' is key field 15 / wire type 3 (group), which is rejected.
        assert!(SentencePieceTokenizer::from_bytes(br#"{"model": {}}"#, 1).is_err());
    }

    #[test]
    fn reads_memory_mapped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.model");
        let words = words(100);
        let refs: Vec<&str> = words.iter().map(String::as_str).collect();
        std::fs::write(&path, model_proto(&refs)).unwrap();

        let tok = SentencePieceTokenizer::from_model_file(&path, 100).unwrap();
        assert_eq!(tok.name(), "sentencepiece");

        let empty = dir.path().join("empty.model");
        std::fs::write(&empty, b"").unwrap();
        assert!(SentencePieceTokenizer::from_model_file(&empty, 1).is_err());
    }
}
