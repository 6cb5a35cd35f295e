use std::path::Path;

use anyhow::{bail, Context, Result};
use consent_core::{ClientCredentialsOptions, ConsentOptions};
use serde::{Deserialize, Serialize};

/// Everything the sample needs: the consent client options, the client
/// credential used to obtain tokens, and the key and scope the walkthrough
/// works with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfiguration {
    pub consent_key: String,
    /// Key format used when the walkthrough creates a group.
    pub consent_key_format: Option<String>,
    pub consent_scope: String,
    pub request_timeout_secs: u64,
    pub token_provider: ClientCredentialsOptions,
    pub consent: ConsentOptions,
}

impl Default for AppConfiguration {
    fn default() -> Self {
        Self {
            consent_key: "1234567890".to_string(),
            consent_key_format: None,
            consent_scope: "read".to_string(),
            request_timeout_secs: 30,
            token_provider: ClientCredentialsOptions::default(),
            consent: ConsentOptions::default(),
        }
    }
}

impl AppConfiguration {
    /// Defaults, then the file at `path` if it exists, then `CONSENT__*`
    /// environment variables (`CONSENT__CONSENT__SUBSCRIPTION_ID`, ...).
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(config::Environment::with_prefix("CONSENT").separator("__"));

        let cfg = builder
            .build()
            .with_context(|| format!("failed to read configuration from {path}"))?;
        let settings: AppConfiguration = cfg.try_deserialize().context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Every problem that would stop the sample from talking to the service.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = self.token_provider.validate() {
            problems.push(e.to_string());
        }
        if self.consent.subscription_id.is_nil() {
            problems.push("consent.subscription_id is required".to_string());
        }
        if self.consent.consent_member.trim().is_empty() {
            problems.push("consent.consent_member is required".to_string());
        }
        if let Err(e) = self.consent.base_url() {
            problems.push(e.to_string());
        }
        if self.consent_key.trim().is_empty() {
            problems.push("consent_key is required".to_string());
        }
        if self.consent_scope.trim().is_empty() {
            problems.push("consent_scope is required".to_string());
        }
        problems
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if !problems.is_empty() {
            bail!("configuration is incomplete: {}", problems.join("; "));
        }
        Ok(())
    }
}
