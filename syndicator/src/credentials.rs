//! Platform credentials read from the process environment.

use std::env;

use async_trait::async_trait;
use syndicator_core::contract::{CredentialStore, Credentials};
use syndicator_core::error::DependencyError;
use tracing::{debug, error};

pub const TOKEN_PREFIX: &str = "SYNDICATOR_TOKEN_";
pub const USER_PREFIX: &str = "SYNDICATOR_USER_";

/// Looks up `SYNDICATOR_TOKEN_<PLATFORM>` (required) and
/// `SYNDICATOR_USER_<PLATFORM>` (optional). The platform id is upper-cased and
/// every non-alphanumeric character becomes `_`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self
    }
}

pub fn env_suffix(platform_id: &str) -> String {
    platform_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get_credentials(&self, platform_id: &str) -> Result<Credentials, DependencyError> {
        let suffix = env_suffix(platform_id);
        let token_var = format!("{TOKEN_PREFIX}{suffix}");
        let token = env::var(&token_var).map_err(|e| {
            error!(error = ?e, var = %token_var, "Publishing token missing in environment");
            DependencyError::permanent(format!("{token_var} is not set"))
        })?;
        let username = env::var(format!("{USER_PREFIX}{suffix}")).ok();
        debug!(platform = %platform_id, has_username = username.is_some(), "Loaded credentials");
        Ok(Credentials { token, username })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn platform_ids_map_to_env_suffixes() {
        assert_eq!(env_suffix("wordpress"), "WORDPRESS");
        assert_eq!(env_suffix("ghost-pro.v2"), "GHOST_PRO_V2");
    }

    #[tokio::test]
    #[serial]
    async fn reads_token_and_optional_username() {
        env::set_var("SYNDICATOR_TOKEN_TESTPLATFORM", "tok");
        env::remove_var("SYNDICATOR_USER_TESTPLATFORM");
        let creds = EnvCredentialStore::new()
            .get_credentials("testplatform")
            .await
            .unwrap();
        assert_eq!(creds.token, "tok");
        assert!(creds.username.is_none());
        env::remove_var("SYNDICATOR_TOKEN_TESTPLATFORM");
    }

    #[tokio::test]
    #[serial]
    async fn missing_token_is_permanent() {
        env::remove_var("SYNDICATOR_TOKEN_NOPE");
        let err = EnvCredentialStore::new()
            .get_credentials("nope")
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
