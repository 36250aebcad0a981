use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use subtle::ConstantTimeEq;

/// The length of a session password.
pub const SESSION_PASSWORD_LENGTH: usize = 16;

/// Generates a new session password: 16 symbols drawn from `[0-9A-Za-z]` using the OS CSPRNG.
pub fn generate_session_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SESSION_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Compares two secrets in constant time.
pub fn secrets_match(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
