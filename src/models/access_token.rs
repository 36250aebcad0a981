use serde::{Deserialize, Serialize};

/// A delegated cloud credential handed back to clients.
///
/// Cached by the broker, never persisted.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer token value.
    pub value: String,
    /// Expiry in epoch milliseconds.
    pub expires_at: i64,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
