use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported input format: {0:?}")]
    UnsupportedInput(PathBuf),
    #[error("empty input: {0:?}")]
    EmptyInput(PathBuf),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
