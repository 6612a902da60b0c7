//! Random token generation
//!
//! Produces the anti-forgery state tokens handed out with the consent page and
//! the verify tokens given to the timeline API for subscription callbacks.
//! Every call seeds a fresh `StdRng` from the operating system's entropy
//! source, so an unavailable random source surfaces as an error instead of a
//! panic deep inside a request handler.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::error::{Error, Result};

/// Uppercase ASCII letters and digits (36 symbols), used for state tokens.
pub const UPPERCASE_DIGITS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Upper- and lowercase ASCII letters and digits (62 symbols), used for verify tokens.
pub const ALPHANUMERIC: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of every token minted by this service.
pub const TOKEN_LEN: usize = 32;

/// Generate `len` characters drawn uniformly from an ASCII `alphabet`.
pub fn generate(alphabet: &[u8], len: usize) -> Result<String> {
    if alphabet.is_empty() {
        return Err(Error::EmptyAlphabet);
    }

    let mut seed = [0u8; 32];
    getrandom::fill(&mut seed).map_err(|e| Error::RandomSource(e.to_string()))?;
    let mut rng = StdRng::from_seed(seed);

    Ok((0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect())
}

/// A fresh anti-forgery state token.
pub fn state_token() -> Result<String> {
    generate(UPPERCASE_DIGITS, TOKEN_LEN)
}

/// A fresh subscription verify token.
pub fn verify_token() -> Result<String> {
    generate(ALPHANUMERIC, TOKEN_LEN)
}
