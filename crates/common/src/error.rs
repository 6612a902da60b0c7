//! Errors shared by config loading and token generation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reading configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Token requested over an alphabet with no symbols
    #[error("token alphabet is empty")]
    EmptyAlphabet,

    /// The OS entropy source refused to seed the generator
    #[error("random source unavailable: {0}")]
    RandomSource(String),
}

pub type Result<T> = std::result::Result<T, Error>;
