//! Secret wrapper for sensitive values
//!
//! Wraps OAuth client secrets and bearer tokens so they never reach logs.

use std::fmt;
use zeroize::Zeroize;

const REDACTED: &str = "[REDACTED]";

/// Value that formats as `[REDACTED]` and is wiped from memory on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the plaintext, e.g. to put it in a token request body.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Build a secret from file or env contents, dropping surrounding whitespace.
    ///
    /// Returns `None` when nothing is left after trimming.
    pub fn from_trimmed(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty() {
            None
        } else {
            Some(Self(value.to_owned()))
        }
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_secret_is_redacted() {
        let secret = Secret::new(String::from("GOCSPX-client-secret"));
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert_eq!(secret.expose(), "GOCSPX-client-secret");
    }

    #[test]
    fn from_trimmed_strips_newlines() {
        let secret = Secret::from_trimmed("  GOCSPX-abc\n").unwrap();
        assert_eq!(secret.expose(), "GOCSPX-abc");
    }

    #[test]
    fn from_trimmed_rejects_blank_input() {
        assert!(Secret::from_trimmed(" \n\t").is_none());
    }
}
