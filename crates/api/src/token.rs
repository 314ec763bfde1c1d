//! Bearer token providers.
//!
//! The engine asks for a token per call (and per poll iteration), so
//! providers must be cheap to call repeatedly and must cache on their own
//! side if fetching is expensive.

use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// Environment variable holding a token used for every scope.
pub const ACCESS_TOKEN_ENV: &str = "SB_ACCESS_TOKEN";

/// Supplies access tokens valid for a given auth scope.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token for `scope`, or `None` when none can be obtained.
    async fn scoped_token(&self, scope: &str) -> Option<String>;
}

/// Hands out preconfigured tokens. Scope-specific entries win over the default.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    default_token: Option<String>,
    scoped: HashMap<String, String>,
}

impl StaticTokenProvider {
    pub fn new(default_token: Option<String>) -> Self {
        Self {
            default_token,
            scoped: HashMap::new(),
        }
    }

    /// Reads the default token from [`ACCESS_TOKEN_ENV`].
    pub fn from_env() -> Self {
        let token = env::var(ACCESS_TOKEN_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self::new(token)
    }

    pub fn with_scope(mut self, scope: impl Into<String>, token: impl Into<String>) -> Self {
        self.scoped.insert(scope.into(), token.into());
        self
    }

    pub fn has_default(&self) -> bool {
        self.default_token.is_some()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn scoped_token(&self, scope: &str) -> Option<String> {
        self.scoped.get(scope).cloned().or_else(|| self.default_token.clone())
    }
}

/// Acquires tokens through the signed-in Azure CLI (`az account get-access-token`).
#[derive(Debug, Clone)]
pub struct AzureCliTokenProvider {
    program: String,
}

impl Default for AzureCliTokenProvider {
    fn default() -> Self {
        Self { program: "az".into() }
    }
}

impl AzureCliTokenProvider {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn scoped_token(&self, scope: &str) -> Option<String> {
        let output = Command::new(&self.program)
            .args(["account", "get-access-token", "--scope", scope, "--query", "accessToken", "-o", "tsv"])
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if token.is_empty() {
                    warn!(scope, "azure cli returned an empty token");
                    return None;
                }
                debug!(scope, "acquired token from azure cli");
                Some(token)
            }
            Ok(output) => {
                warn!(
                    scope,
                    code = output.status.code(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "azure cli token request failed"
                );
                None
            }
            Err(error) => {
                warn!(scope, error = %error, "could not launch azure cli");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scoped_entries_take_precedence() {
        let provider = StaticTokenProvider::new(Some("fallback".into())).with_scope("scope-a", "token-a");
        assert_eq!(provider.scoped_token("scope-a").await.as_deref(), Some("token-a"));
        assert_eq!(provider.scoped_token("scope-b").await.as_deref(), Some("fallback"));
    }

    #[tokio::test]
    async fn empty_provider_yields_none() {
        let provider = StaticTokenProvider::default();
        assert!(provider.scoped_token("anything").await.is_none());
    }

    #[test]
    fn from_env_ignores_blank_values() {
        temp_env::with_var(ACCESS_TOKEN_ENV, Some("   "), || {
            assert!(!StaticTokenProvider::from_env().has_default());
        });
        temp_env::with_var(ACCESS_TOKEN_ENV, Some("abc"), || {
            assert!(StaticTokenProvider::from_env().has_default());
        });
    }

    #[tokio::test]
    async fn missing_azure_cli_yields_none() {
        let provider = AzureCliTokenProvider::with_program("definitely-not-an-installed-binary");
        assert!(provider.scoped_token("https://management.azure.com/.default").await.is_none());
    }
}
