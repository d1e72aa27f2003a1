//! Text ↔ token id boundary.
//!
//! The model only sees token ids. `TextTokenizer` wraps a HuggingFace
//! `tokenizer.json` (e.g. the 20B Pile tokenizer); `ByteTokenizer` maps raw
//! UTF-8 bytes to ids 0..256 for demos without a tokenizer file.

use crate::error::TokenizerError;
use std::path::Path;
use tokenizers::Tokenizer;

pub trait TokenCodec: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<usize>, TokenizerError>;
    fn decode(&self, ids: &[usize]) -> Result<String, TokenizerError>;
}

pub struct TextTokenizer {
    inner: Tokenizer,
}

impl TextTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path).map_err(|e| TokenizerError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl TokenCodec for TextTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<usize>, TokenizerError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::Codec(e.to_string()))?;
        Ok(encoding.get_ids().iter().map(|&id| id as usize).collect())
    }

    fn decode(&self, ids: &[usize]) -> Result<String, TokenizerError> {
        let ids: Vec<u32> = ids.iter().map(|&id| id as u32).collect();
        self.inner
            .decode(&ids, false)
            .map_err(|e| TokenizerError::Codec(e.to_string()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ByteTokenizer;

impl TokenCodec for ByteTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<usize>, TokenizerError> {
        Ok(text.bytes().map(usize::from).collect())
    }

    fn decode(&self, ids: &[usize]) -> Result<String, TokenizerError> {
        let bytes = ids
            .iter()
            .map(|&id| {
                u8::try_from(id)
                    .map_err(|_| TokenizerError::Codec(format!("token {} is not a byte", id)))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Turns a token stream into text, holding tokens back while they decode to
/// an incomplete multi-byte sequence (shown as U+FFFD).
#[derive(Debug, Default, Clone)]
pub struct StreamDecoder {
    pending: Vec<usize>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the newly completed text, if any.
    pub fn push(
        &mut self,
        token: usize,
        codec: &dyn TokenCodec,
    ) -> Result<Option<String>, TokenizerError> {
        self.pending.push(token);
        let text = codec.decode(&self.pending)?;
        if text.contains('\u{fffd}') {
            return Ok(None);
        }
        self.pending.clear();
        Ok(Some(text))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
