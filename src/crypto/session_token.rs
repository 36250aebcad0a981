//! Session token codec.
//!
//! A session token binds a session id to the session password:
//!
//! ```text
//! base64url({"session_id": "<id>"}) "." base64url(encrypt(password))
//! ```
//!
//! Knowing a session id is not enough to use the session; the holder must
//! also present the password, encrypted under the session-token key.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::envelope::EncryptionBackend;
use crate::crypto::password::secrets_match;
use crate::error::{BrokerError, Result};
use crate::models::session::Session;
use crate::repositories::store::ModelStore;

const SEPARATOR: char = '.';

#[derive(Serialize, Deserialize)]
struct TokenHeader {
    session_id: String,
}

/// The decoded parts of a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub session_id: String,
    pub encrypted_password: Vec<u8>,
}

/// Builds and verifies session tokens.
#[derive(Clone)]
pub struct SessionTokenCodec {
    encryption: Arc<dyn EncryptionBackend>,
    key_id: String,
    store: ModelStore,
}

impl SessionTokenCodec {
    /// Creates a codec encrypting passwords under `key_id` and loading sessions from `store`.
    pub fn new(
        encryption: Arc<dyn EncryptionBackend>,
        key_id: impl Into<String>,
        store: ModelStore,
    ) -> Self {
        Self {
            encryption,
            key_id: key_id.into(),
            store,
        }
    }

    /// Encodes a token for `session`.
    pub async fn marshall(&self, session: &Session) -> Result<String> {
        let encrypted_password = self
            .encryption
            .encrypt(&self.key_id, session.password.as_bytes())
            .await?;

        let header = sonic_rs::to_vec(&TokenHeader {
            session_id: session.id.clone(),
        })?;

        Ok(format!(
            "{}{}{}",
            URL_SAFE_NO_PAD.encode(header),
            SEPARATOR,
            URL_SAFE_NO_PAD.encode(encrypted_password)
        ))
    }

    /// Splits and decodes `token` without touching the store.
    pub fn unmarshall(&self, token: &str) -> Result<SessionToken> {
        let parts: Vec<&str> = token.split(SEPARATOR).collect();
        let [header, password] = parts.as_slice() else {
            return Err(BrokerError::InvalidToken(format!(
                "expected 2 parts, found {}",
                parts.len()
            )));
        };

        let header = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| BrokerError::InvalidToken("header is not base64url".to_string()))?;
        let encrypted_password = URL_SAFE_NO_PAD
            .decode(password)
            .map_err(|_| BrokerError::InvalidToken("password is not base64url".to_string()))?;

        let header: TokenHeader = sonic_rs::from_slice(&header)
            .map_err(|_| BrokerError::InvalidToken("malformed header".to_string()))?;
        if header.session_id.is_empty() {
            return Err(BrokerError::InvalidToken("empty session id".to_string()));
        }

        Ok(SessionToken {
            session_id: header.session_id,
            encrypted_password,
        })
    }

    /// Loads the session named by `token` and checks the token's password against it.
    pub async fn resolve(&self, token: &str) -> Result<Session> {
        let SessionToken {
            session_id,
            encrypted_password,
        } = self.unmarshall(token)?;

        let session: Session = match self.store.get(&session_id).await {
            Ok(session) => session,
            Err(BrokerError::NotFound(_)) => {
                return Err(BrokerError::Unauthenticated(format!(
                    "session {} not found",
                    session_id
                )));
            }
            Err(e) => return Err(e),
        };

        let password = Zeroizing::new(
            self.encryption
                .decrypt(&self.key_id, &encrypted_password)
                .await
                .map_err(|_| {
                    BrokerError::Unauthenticated(format!(
                        "session {} token password does not decrypt",
                        session_id
                    ))
                })?,
        );

        if !secrets_match(&password, session.password.as_bytes()) {
            return Err(BrokerError::Unauthenticated(format!(
                "session {} password mismatch",
                session_id
            )));
        }

        Ok(session)
    }
}
