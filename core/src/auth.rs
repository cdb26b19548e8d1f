//! Token-based client authentication
//!
//! The expected token is discovered once at startup: an explicit value
//! wins, then the `OKXUS_AUTH_TOKEN` environment variable, then the
//! `auth_token` field of the config file. Finding nothing is a fatal
//! configuration error, never a validate-time bypass.

use crate::error::{BridgeError, Result};

/// Environment variable checked before the config file.
pub const TOKEN_ENV_VAR: &str = "OKXUS_AUTH_TOKEN";

pub struct Authenticator {
    token: String,
}

impl Authenticator {
    /// Construct with an explicit token. Empty tokens are rejected.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(BridgeError::MissingToken);
        }
        Ok(Self { token })
    }

    /// Discover the token: environment variable first, then the config
    /// file value. `config_token` is whatever the config layer holds,
    /// already stripped of placeholder values.
    pub fn from_sources(config_token: Option<&str>) -> Result<Self> {
        if let Ok(env_token) = std::env::var(TOKEN_ENV_VAR) {
            if !env_token.is_empty() {
                return Self::new(env_token);
            }
        }
        if let Some(file_token) = config_token.filter(|t| !t.is_empty()) {
            return Self::new(file_token);
        }
        Err(BridgeError::MissingToken)
    }

    /// True iff `candidate` equals the held token. Compares every byte
    /// regardless of where the first mismatch is, so timing reveals at
    /// most the token length.
    pub fn validate(&self, candidate: &str) -> bool {
        if candidate.is_empty() || candidate.len() != self.token.len() {
            return false;
        }
        candidate
            .bytes()
            .zip(self.token.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
