//! Common types for the Glass connect service

mod error;
pub mod nonce;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
