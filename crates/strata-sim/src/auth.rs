//! Handshake credential validation.
//!
//! Session tokens are issued by an external control plane. The simulation
//! only checks a presented `(session_token, client_id)` pair through a
//! [`SessionValidator`].

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use strata_config::{AuthConfig, AuthMode, TokenEntry};

/// Reasons a handshake is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Token or client id is empty.
    #[error("session token and client id are required")]
    MissingCredentials,

    /// The token is not known.
    #[error("unknown session token")]
    UnknownToken,

    /// The token was issued to another client.
    #[error("token does not belong to client {0}")]
    ClientMismatch(String),

    /// The token is past its expiry.
    #[error("session token expired")]
    Expired,

    /// The client speaks another protocol version.
    #[error("protocol version {client} not supported (server speaks {server})")]
    VersionMismatch { client: u32, server: u32 },

    /// The peer already completed a handshake.
    #[error("connection already authenticated")]
    AlreadyAuthenticated,

    /// Another live connection holds this client id.
    #[error("client {0} is already connected")]
    DuplicateClient(String),
}

/// Delegated check of handshake credentials.
pub trait SessionValidator: Send {
    fn validate(&self, session_token: &str, client_id: &str) -> Result<(), AuthError>;
}

/// Accepts any non-empty credentials. For development servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenValidator;

impl SessionValidator for OpenValidator {
    fn validate(&self, session_token: &str, client_id: &str) -> Result<(), AuthError> {
        if session_token.is_empty() || client_id.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct IssuedToken {
    client_id: String,
    expires_at_unix: Option<u64>,
}

/// A static table of issued tokens.
#[derive(Debug, Default, Clone)]
pub struct TokenTable {
    tokens: HashMap<String, IssuedToken>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a TokenEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.insert(&entry.token, &entry.client_id, entry.expires_at_unix);
        }
        table
    }

    /// Add or replace a token.
    pub fn insert(&mut self, token: &str, client_id: &str, expires_at_unix: Option<u64>) {
        self.tokens.insert(
            token.to_string(),
            IssuedToken {
                client_id: client_id.to_string(),
                expires_at_unix,
            },
        );
    }

    /// Validate against an explicit clock.
    pub fn validate_at(
        &self,
        session_token: &str,
        client_id: &str,
        now_unix: u64,
    ) -> Result<(), AuthError> {
        if session_token.is_empty() || client_id.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let issued = self
            .tokens
            .get(session_token)
            .ok_or(AuthError::UnknownToken)?;
        if issued.client_id != client_id {
            return Err(AuthError::ClientMismatch(client_id.to_string()));
        }
        if issued.expires_at_unix.is_some_and(|exp| now_unix >= exp) {
            return Err(AuthError::Expired);
        }
        Ok(())
    }
}

impl SessionValidator for TokenTable {
    fn validate(&self, session_token: &str, client_id: &str) -> Result<(), AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        self.validate_at(session_token, client_id, now)
    }
}

/// Build the validator an [`AuthConfig`] asks for.
pub fn validator_from_config(config: &AuthConfig) -> Box<dyn SessionValidator> {
    match config.mode {
        AuthMode::Open => Box::new(OpenValidator),
        AuthMode::Tokens => Box::new(TokenTable::from_entries(&config.tokens)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_non_empty() {
        assert!(OpenValidator.validate("t", "c").is_ok());
        assert_eq!(
            OpenValidator.validate("", "c"),
            Err(AuthError::MissingCredentials)
        );
        assert_eq!(
            OpenValidator.validate("t", ""),
            Err(AuthError::MissingCredentials)
        );
    }

    #[test]
    fn test_token_table_checks() {
        let mut table = TokenTable::new();
        table.insert("tok-a", "client_a", Some(1_000));
        table.insert("tok-b", "client_b", None);

        assert!(table.validate_at("tok-a", "client_a", 999).is_ok());
        assert_eq!(
            table.validate_at("tok-a", "client_a", 1_000),
            Err(AuthError::Expired)
        );
        assert_eq!(
            table.validate_at("tok-a", "client_b", 0),
            Err(AuthError::ClientMismatch("client_b".into()))
        );
        assert_eq!(
            table.validate_at("nope", "client_a", 0),
            Err(AuthError::UnknownToken)
        );
        assert!(table.validate_at("tok-b", "client_b", u64::MAX).is_ok());
    }

    #[test]
    fn test_validator_from_config() {
        let open = validator_from_config(&AuthConfig::default());
        assert!(open.validate("any", "one").is_ok());

        let config = AuthConfig {
            mode: AuthMode::Tokens,
            tokens: vec![TokenEntry {
                token: "secret".into(),
                client_id: "client_01".into(),
                expires_at_unix: None,
            }],
        };
        let tokens = validator_from_config(&config);
        assert!(tokens.validate("secret", "client_01").is_ok());
        assert_eq!(tokens.validate("any", "one"), Err(AuthError::UnknownToken));
    }
}
