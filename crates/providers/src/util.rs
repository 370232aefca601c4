//! Shared utility functions for engine adapters.

use orc_domain::config::engine::AuthConfig;
use orc_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Engine`].
pub(crate) fn from_reqwest(engine: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Engine { engine: engine.to_string(), message: e.to_string() }
    }
}

/// Resolve the API key / bearer token from an [`AuthConfig`].
///
/// Precedence:
/// 1. `key` (plaintext — warn, intended for local/dev use)
/// 2. `env` (reads the named environment variable)
/// 3. Error
///
/// There is no OS-keychain integration here: the reference `RemoteApiEngine`
/// adapter is a thin example, not a credential manager.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(ref key) = auth.key {
        tracing::warn!("API key loaded from plaintext config field 'key' — prefer 'env'");
        return Ok(key.clone());
    }

    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var).map_err(|_| {
            Error::Config(format!(
                "environment variable '{env_var}' not set or not valid UTF-8"
            ))
        });
    }

    Err(Error::Config(
        "no API key configured: set 'key' or 'env' in the engine's AuthConfig".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_plaintext() {
        let auth = AuthConfig { key: Some("sk-test-123".into()), ..Default::default() };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test-123");
    }

    #[test]
    fn resolve_api_key_env_var() {
        let var_name = "ORC_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        let auth = AuthConfig { env: Some(var_name.into()), ..Default::default() };
        assert_eq!(resolve_api_key(&auth).unwrap(), "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_env_var_missing() {
        let auth = AuthConfig { env: Some("ORC_TEST_NONEXISTENT_VAR_8888".into()), ..Default::default() };
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("ORC_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn resolve_api_key_no_config() {
        let auth = AuthConfig::default();
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }

    #[test]
    fn resolve_api_key_plaintext_takes_precedence_over_env() {
        let auth = AuthConfig {
            key: Some("plaintext-wins".into()),
            env: Some("ORC_TEST_SHOULD_NOT_BE_READ".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "plaintext-wins");
    }
}
