use crate::error::{BrokerError, Result};

/// Maximum accepted length of a principal, target or scope.
const MAX_FIELD_LENGTH: usize = 1024;

/// Validates a required string parameter.
///
/// # Arguments
///
/// * `name` - The parameter name, used in the error message.
/// * `value` - The value to validate.
pub fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BrokerError::InvalidArgument(format!(
            "Request must provide the `{}` parameter",
            name
        )));
    }

    if value.len() > MAX_FIELD_LENGTH {
        return Err(BrokerError::InvalidArgument(format!(
            "`{}` must be at most {} characters",
            name, MAX_FIELD_LENGTH
        )));
    }

    Ok(())
}

/// Validates requested scopes against the configured whitelist.
///
/// An empty list is an invalid argument; a scope outside `allowed` is denied.
pub fn validate_scopes(scopes: &[String], allowed: &[String]) -> Result<()> {
    if scopes.is_empty() {
        return Err(BrokerError::InvalidArgument(
            "Request must provide the `scopes` parameter".to_string(),
        ));
    }

    for scope in scopes {
        require_non_empty("scopes", scope)?;
        if !allowed.iter().any(|a| a == scope) {
            return Err(BrokerError::PermissionDenied(format!(
                "`{}` is not a whitelisted scope",
                scope
            )));
        }
    }

    Ok(())
}
