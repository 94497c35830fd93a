//! Square Configuration
//!
//! Sandbox and production each have their own application id, location id
//! and optional webhook signature key. The active set is picked once at
//! startup; production with missing ids falls back to sandbox.

use secrecy::SecretString;

use crate::error::{PaymentError, Result};

/// Which Square environment to talk to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SquareEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl SquareEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            SquareEnvironment::Sandbox => "https://connect.squareupsandbox.com",
            SquareEnvironment::Production => "https://connect.squareup.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SquareEnvironment::Sandbox => "sandbox",
            SquareEnvironment::Production => "production",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "sandbox" => Ok(SquareEnvironment::Sandbox),
            "production" => Ok(SquareEnvironment::Production),
            other => Err(PaymentError::Config(format!(
                "SQUARE_ENVIRONMENT must be sandbox or production, got {other}"
            ))),
        }
    }
}

/// One environment's credential set
#[derive(Clone, Debug, Default)]
pub struct SquareCredentials {
    pub application_id: String,
    pub location_id: String,
    pub webhook_signature_key: Option<SecretString>,
}

impl SquareCredentials {
    fn is_complete(&self) -> bool {
        !self.application_id.is_empty() && !self.location_id.is_empty()
    }
}

/// Resolved Square settings
#[derive(Clone, Debug)]
pub struct SquareConfig {
    pub environment: SquareEnvironment,
    pub access_token: SecretString,
    pub credentials: SquareCredentials,
    /// Where the buyer lands after paying
    pub redirect_url: String,
    /// Public URL Square posts webhooks to (part of the signed payload)
    pub webhook_url: Option<String>,
}

/// Default post-payment landing page
pub const DEFAULT_REDIRECT_URL: &str = "https://cupids-seven.vercel.app/purchase.html?success=true";

impl SquareConfig {
    /// Build from a key lookup (environment variables in production)
    ///
    /// Returns `Ok(None)` when no access token is configured, meaning
    /// payments are disabled.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(access_token) = get("SQUARE_ACCESS_TOKEN") else {
            return Ok(None);
        };

        let requested = SquareEnvironment::parse(&get("SQUARE_ENVIRONMENT").unwrap_or_default())?;
        let credentials_for = |prefix: &str| SquareCredentials {
            application_id: get(&format!("SQUARE_{prefix}_APPLICATION_ID")).unwrap_or_default(),
            location_id: get(&format!("SQUARE_{prefix}_LOCATION_ID")).unwrap_or_default(),
            webhook_signature_key: get(&format!("SQUARE_{prefix}_WEBHOOK_SIGNATURE_KEY"))
                .map(SecretString::from),
        };
        let sandbox = credentials_for("SANDBOX");
        let production = credentials_for("PRODUCTION");

        let (environment, credentials) = match requested {
            SquareEnvironment::Production if production.is_complete() => {
                (SquareEnvironment::Production, production)
            }
            SquareEnvironment::Production => {
                tracing::error!(
                    "Production Square credentials incomplete (application id / location id), falling back to sandbox"
                );
                (SquareEnvironment::Sandbox, sandbox)
            }
            SquareEnvironment::Sandbox => (SquareEnvironment::Sandbox, sandbox),
        };

        if credentials.location_id.is_empty() {
            return Err(PaymentError::Config(format!(
                "SQUARE_{}_LOCATION_ID not set",
                environment.as_str().to_uppercase()
            )));
        }

        Ok(Some(Self {
            environment,
            access_token: SecretString::from(access_token),
            credentials,
            redirect_url: get("CHECKOUT_REDIRECT_URL")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URL.to_string()),
            webhook_url: get("SQUARE_WEBHOOK_URL"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_no_token_disables_payments() {
        let config = SquareConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn test_sandbox_default() {
        let config = SquareConfig::from_lookup(lookup(&[
            ("SQUARE_ACCESS_TOKEN", "tok"),
            ("SQUARE_SANDBOX_APPLICATION_ID", "sandbox-app"),
            ("SQUARE_SANDBOX_LOCATION_ID", "LSANDBOX"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.environment, SquareEnvironment::Sandbox);
        assert_eq!(config.credentials.location_id, "LSANDBOX");
        assert_eq!(config.redirect_url, DEFAULT_REDIRECT_URL);
        assert!(config.credentials.webhook_signature_key.is_none());
    }

    #[test]
    fn test_incomplete_production_falls_back_to_sandbox() {
        let config = SquareConfig::from_lookup(lookup(&[
            ("SQUARE_ACCESS_TOKEN", "tok"),
            ("SQUARE_ENVIRONMENT", "production"),
            ("SQUARE_PRODUCTION_APPLICATION_ID", "prod-app"),
            ("SQUARE_SANDBOX_APPLICATION_ID", "sandbox-app"),
            ("SQUARE_SANDBOX_LOCATION_ID", "LSANDBOX"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.environment, SquareEnvironment::Sandbox);
        assert_eq!(config.credentials.application_id, "sandbox-app");
    }

    #[test]
    fn test_complete_production() {
        let config = SquareConfig::from_lookup(lookup(&[
            ("SQUARE_ACCESS_TOKEN", "tok"),
            ("SQUARE_ENVIRONMENT", "Production"),
            ("SQUARE_PRODUCTION_APPLICATION_ID", "prod-app"),
            ("SQUARE_PRODUCTION_LOCATION_ID", "LPROD"),
            ("SQUARE_PRODUCTION_WEBHOOK_SIGNATURE_KEY", "sig"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.environment, SquareEnvironment::Production);
        assert_eq!(config.environment.base_url(), "https://connect.squareup.com");
        assert!(config.credentials.webhook_signature_key.is_some());
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let result = SquareConfig::from_lookup(lookup(&[
            ("SQUARE_ACCESS_TOKEN", "tok"),
            ("SQUARE_ENVIRONMENT", "staging"),
        ]));
        assert!(matches!(result, Err(PaymentError::Config(_))));
    }
}
