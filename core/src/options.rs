//! Client configuration.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::ConsentError;

/// Production endpoint of the consent service.
pub const DEFAULT_CONSENT_SERVICE_URI: &str = "https://gateway.kmdlogic.io/consent/v1";

/// Settings a `ConsentClient` is constructed with. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentOptions {
    /// Base URI of the service. Only overridden for testing.
    pub consent_service_uri: String,
    /// Subscription that owns or participates in the consent groups.
    pub subscription_id: Uuid,
    /// Group the consent operations act on.
    pub consent_group_id: Uuid,
    /// Member the client acts on behalf of unless a call names another.
    pub consent_member: String,
}

impl Default for ConsentOptions {
    fn default() -> Self {
        Self {
            consent_service_uri: DEFAULT_CONSENT_SERVICE_URI.to_string(),
            subscription_id: Uuid::nil(),
            consent_group_id: Uuid::nil(),
            consent_member: String::new(),
        }
    }
}

impl ConsentOptions {
    pub fn new(subscription_id: Uuid, consent_group_id: Uuid, consent_member: impl Into<String>) -> Self {
        Self {
            subscription_id,
            consent_group_id,
            consent_member: consent_member.into(),
            ..Self::default()
        }
    }

    pub fn with_service_uri(mut self, uri: impl Into<String>) -> Self {
        self.consent_service_uri = uri.into();
        self
    }

    /// Parse and check the service URI.
    pub fn base_url(&self) -> Result<Url, ConsentError> {
        let url = Url::parse(&self.consent_service_uri).map_err(|e| ConsentError::Configuration {
            message: format!(
                "invalid consent service uri '{}': {e}",
                self.consent_service_uri
            ),
            body: None,
        })?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(ConsentError::Configuration {
                message: format!(
                    "consent service uri '{}' is not an http(s) base url",
                    self.consent_service_uri
                ),
                body: None,
            });
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_production_gateway() {
        let options = ConsentOptions::default();
        assert_eq!(options.consent_service_uri, DEFAULT_CONSENT_SERVICE_URI);
        assert!(options.subscription_id.is_nil());
        assert!(options.base_url().is_ok());
    }

    #[test]
    fn rejects_unparseable_uri() {
        let options = ConsentOptions::default().with_service_uri("not a url");
        assert!(matches!(
            options.base_url(),
            Err(ConsentError::Configuration { .. })
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let options = ConsentOptions::default().with_service_uri("mailto:someone@example.com");
        assert!(options.base_url().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let options: ConsentOptions = serde_json::from_str(
            r#"{"subscription_id":"11111111-1111-1111-1111-111111111111","consent_member":"Acme"}"#,
        )
        .unwrap();
        assert_eq!(options.consent_member, "Acme");
        assert_eq!(options.consent_service_uri, DEFAULT_CONSENT_SERVICE_URI);
        assert!(options.consent_group_id.is_nil());
    }
}
