//! Shared utility functions for provider adapters.

use parley_domain::config::{AuthConfig, AuthMode};
use parley_domain::error::{Error, FailureKind, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::provider(provider, FailureKind::ProviderTimeout, e.to_string())
    } else {
        Error::provider(provider, FailureKind::ProviderTransport, e.to_string())
    }
}

/// Classify an HTTP error response into a failure kind using its status
/// code and body (§4.3).
pub(crate) fn classify_http_error(status: reqwest::StatusCode, body: &str) -> FailureKind {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return FailureKind::ProviderRateLimit;
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return FailureKind::ProviderAuth;
    }
    if status.is_server_error() {
        return FailureKind::ProviderTransport;
    }
    let lower = body.to_lowercase();
    if lower.contains("context_length") || lower.contains("maximum context length") {
        return FailureKind::ProviderContextLength;
    }
    FailureKind::ProviderInvalid
}

/// Resolve the API key from an [`AuthConfig`].
///
/// Precedence: plaintext `key` field, then `env` var. `AuthMode::None`
/// short-circuits to an empty key (local/offline providers).
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if matches!(auth.mode, AuthMode::None) {
        return Ok(String::new());
    }
    if let Some(ref key) = auth.key {
        tracing::warn!(
            "API key loaded from plaintext config field 'key' — prefer 'env' mode instead"
        );
        return Ok(key.clone());
    }
    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var).map_err(|_| {
            Error::Auth(format!(
                "environment variable '{env_var}' not set or not valid UTF-8"
            ))
        });
    }
    Err(Error::Auth(
        "no API key configured: set 'key' or 'env' in AuthConfig".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_plaintext() {
        let auth = AuthConfig {
            key: Some("sk-test-123".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test-123");
    }

    #[test]
    fn resolve_api_key_env_var() {
        let var_name = "PARLEY_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        let auth = AuthConfig {
            env: Some(var_name.into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_env_var_missing() {
        let auth = AuthConfig {
            env: Some("PARLEY_TEST_NONEXISTENT_VAR_8888".into()),
            ..Default::default()
        };
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("PARLEY_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn resolve_api_key_no_config() {
        let auth = AuthConfig::default();
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }

    #[test]
    fn resolve_api_key_none_mode_is_empty() {
        let auth = AuthConfig {
            mode: AuthMode::None,
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "");
    }

    #[test]
    fn classify_http_error_rate_limit() {
        assert_eq!(
            classify_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            FailureKind::ProviderRateLimit
        );
    }

    #[test]
    fn classify_http_error_context_length() {
        assert_eq!(
            classify_http_error(
                reqwest::StatusCode::BAD_REQUEST,
                "maximum context length exceeded"
            ),
            FailureKind::ProviderContextLength
        );
    }

    #[test]
    fn classify_http_error_server_error_is_transport() {
        assert_eq!(
            classify_http_error(reqwest::StatusCode::BAD_GATEWAY, ""),
            FailureKind::ProviderTransport
        );
    }
}
