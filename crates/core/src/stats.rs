use std::str::FromStr;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerKind {
    #[default]
    Cl100k,
    Gpt2,
    O200k,
}

impl TokenizerKind {
    pub fn build(&self) -> Result<tiktoken_rs::CoreBPE> {
        match self {
            TokenizerKind::Cl100k => {
                tiktoken_rs::cl100k_base().map_err(|e| CoreError::Tokenizer(e.to_string()))
            }
            TokenizerKind::Gpt2 => {
                tiktoken_rs::p50k_base().map_err(|e| CoreError::Tokenizer(e.to_string()))
            }
            TokenizerKind::O200k => {
                tiktoken_rs::o200k_base().map_err(|e| CoreError::Tokenizer(e.to_string()))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenizerKind::Cl100k => "cl100k_base",
            TokenizerKind::Gpt2 => "p50k_base",
            TokenizerKind::O200k => "o200k_base",
        }
    }
}

impl FromStr for TokenizerKind {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "cl100k" | "cl100k_base" => Ok(TokenizerKind::Cl100k),
            "o200k" | "o200k_base" => Ok(TokenizerKind::O200k),
            "gpt2" | "p50k" | "p50k_base" => Ok(TokenizerKind::Gpt2),
            other => Err(CoreError::Tokenizer(format!("unknown tokenizer {other}"))),
        }
    }
}

pub fn estimate_tokens(text: &str, tokenizer: &TokenizerKind) -> Result<usize> {
    let encoder = tokenizer.build()?;
    Ok(estimate_tokens_with_bpe(text, &encoder))
}

pub fn estimate_tokens_with_bpe(text: &str, tokenizer: &tiktoken_rs::CoreBPE) -> usize {
    tokenizer.encode_with_special_tokens(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tokenizer_aliases() {
        assert_eq!("cl100k".parse::<TokenizerKind>().unwrap(), TokenizerKind::Cl100k);
        assert_eq!("P50K_BASE".parse::<TokenizerKind>().unwrap(), TokenizerKind::Gpt2);
        assert_eq!("o200k_base".parse::<TokenizerKind>().unwrap(), TokenizerKind::O200k);
        assert!("sentencepiece".parse::<TokenizerKind>().is_err());
    }

    #[test]
    fn counts_tokens() {
        let count = estimate_tokens("Start broad-spectrum antibiotics within one hour.", &TokenizerKind::Cl100k)
            .unwrap();
        assert!(count > 5 && count < 20);
        assert_eq!(estimate_tokens("", &TokenizerKind::Cl100k).unwrap(), 0);
    }
}
