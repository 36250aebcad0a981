use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::password::generate_session_password;
use crate::repositories::store::Model;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The renewal window and hard lifetime cap applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLifetime {
    /// How far a renewal pushes `expires_at` (RENEW_PERIOD).
    pub renew_period_ms: i64,
    /// Cap on `expires_at - creation_time` (MAXIMUM_LIFETIME).
    pub maximum_lifetime_ms: i64,
}

impl SessionLifetime {
    /// `min(now + RENEW_PERIOD, creation_time + MAXIMUM_LIFETIME)`.
    pub fn expiry(&self, creation_time: i64, now: i64) -> i64 {
        now.saturating_add(self.renew_period_ms)
            .min(creation_time.saturating_add(self.maximum_lifetime_ms))
    }
}

/// A delegated, renewable authorization granted by `owner` to `renewer`
/// for `target` and `scopes`.
///
/// `password` is the session secret bound into session tokens. It is
/// zeroized on drop and never shown by `Debug`.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    #[zeroize(skip)]
    pub id: String,
    #[zeroize(skip)]
    pub owner: String,
    #[zeroize(skip)]
    pub renewer: String,
    #[zeroize(skip)]
    pub target: String,
    #[zeroize(skip)]
    pub scopes: Vec<String>,
    pub password: String,
    #[zeroize(skip)]
    pub creation_time: i64,
    #[zeroize(skip)]
    pub expires_at: i64,
}

impl Session {
    /// Creates a session stamped with `now` as its creation time.
    pub fn new(
        owner: impl Into<String>,
        renewer: impl Into<String>,
        target: impl Into<String>,
        scopes: Vec<String>,
        lifetime: &SessionLifetime,
        now: i64,
    ) -> Self {
        let mut ordered: Vec<String> = Vec::with_capacity(scopes.len());
        for scope in scopes {
            if !ordered.contains(&scope) {
                ordered.push(scope);
            }
        }

        Self {
            id: Uuid::new_v4().to_string(),
            owner: owner.into(),
            renewer: renewer.into(),
            target: target.into(),
            scopes: ordered,
            password: generate_session_password(),
            creation_time: now,
            expires_at: lifetime.expiry(now, now),
        }
    }

    /// Extends the session from `now`, never past the lifetime cap.
    pub fn renew(&mut self, lifetime: &SessionLifetime, now: i64) {
        self.expires_at = lifetime.expiry(self.creation_time, now);
    }

    /// Whether the session is expired at `now` (inclusive boundary).
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Whether the session is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

impl Model for Session {
    const KIND: &'static str = "Session";

    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("renewer", &self.renewer)
            .field("target", &self.target)
            .field("scopes", &self.scopes)
            .field("password", &"<redacted>")
            .field("creation_time", &self.creation_time)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
