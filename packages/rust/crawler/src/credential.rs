//! Listing service credentials.
//!
//! The secret itself never lives in config: config names the environment
//! variable, and the provider reads it when a request is built.

use std::sync::RwLock;

use wateroflife_shared::Result;

/// Source of the bearer token attached to listing requests.
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` to send requests unauthenticated.
    fn credential(&self) -> Option<String>;

    /// Re-acquire the token after the service rejected it.
    fn refresh(&self) -> Result<()>;
}

/// Reads the token from an environment variable.
#[derive(Debug)]
pub struct EnvCredential {
    var: String,
    cached: RwLock<Option<String>>,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        let var = var.into();
        let cached = RwLock::new(read_var(&var));
        Self { var, cached }
    }
}

impl CredentialProvider for EnvCredential {
    fn credential(&self) -> Option<String> {
        self.cached.read().ok().and_then(|token| token.clone())
    }

    fn refresh(&self) -> Result<()> {
        let fresh = read_var(&self.var);
        if let Ok(mut token) = self.cached.write() {
            *token = fresh;
        }
        tracing::debug!(var = %self.var, "credential refreshed");
        Ok(())
    }
}

/// No credential at all, for listings that need no token.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn credential(&self) -> Option<String> {
        None
    }

    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

fn read_var(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_means_unauthenticated() {
        let provider = EnvCredential::new("WATEROFLIFE_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert_eq!(provider.credential(), None);
        provider.refresh().unwrap();
        assert_eq!(provider.credential(), None);
    }

    #[test]
    fn anonymous_has_no_token() {
        assert!(Anonymous.credential().is_none());
        assert!(Anonymous.refresh().is_ok());
    }
}
