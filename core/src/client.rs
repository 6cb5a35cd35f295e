//! Async client for the consent service.
//!
//! # Design
//! `ConsentClient` combines an `HttpTransport`, a `TokenProvider` and
//! `ConsentOptions`. Every operation is one round-trip: build the request
//! with `ConsentRequests`, attach a bearer token, execute it, and hand the
//! response back to the matching `parse_*`. The `ConsentRequests` handle is
//! created on first use through a `OnceLock` and shared by all later calls.
//! There is no retry, caching or cancellation beyond what the transport
//! provides.

use std::fmt;
use std::sync::{Arc, OnceLock};

use url::Url;
use uuid::Uuid;

use crate::auth::TokenProvider;
use crate::error::ConsentError;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::options::ConsentOptions;
use crate::requests::ConsentRequests;
use crate::types::{
    ConsentGroup, ConsentGroupRequest, ConsentGroupSummary, ConsentInstance, ConsentLookup,
    MemberConsentResponse, SaveConsent,
};

/// Client for managing consent shared between member systems.
///
/// Using the service requires a subscription, a client credential for the
/// token provider, and a consent group naming the members and what each
/// may do.
pub struct ConsentClient {
    transport: Arc<dyn HttpTransport>,
    token_provider: Arc<dyn TokenProvider>,
    options: ConsentOptions,
    base_url: Url,
    requests: OnceLock<ConsentRequests>,
}

impl fmt::Debug for ConsentClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ConsentClient {
    pub fn builder() -> ConsentClientBuilder {
        ConsentClientBuilder::default()
    }

    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token_provider: Arc<dyn TokenProvider>,
        options: ConsentOptions,
    ) -> Result<Self, ConsentError> {
        Self::builder()
            .transport(transport)
            .token_provider(token_provider)
            .options(options)
            .build()
    }

    pub fn options(&self) -> &ConsentOptions {
        &self.options
    }

    /// A client for another consent group, sharing this client's transport
    /// and token provider.
    pub fn for_group(&self, consent_group_id: Uuid) -> ConsentClient {
        let mut options = self.options.clone();
        options.consent_group_id = consent_group_id;
        ConsentClient {
            transport: Arc::clone(&self.transport),
            token_provider: Arc::clone(&self.token_provider),
            options,
            base_url: self.base_url.clone(),
            requests: OnceLock::new(),
        }
    }

    /// Complete consent details for `key`. Requires both read and write
    /// permission for `member` (default: the configured member).
    ///
    /// Returns `None` if the key is unknown.
    pub async fn review_consent(
        &self,
        key: &str,
        member: Option<&str>,
    ) -> Result<Option<ConsentInstance>, ConsentError> {
        let requests = self.requests();
        let response = self.send(requests.build_review_consent(key, member)?).await?;
        requests.parse_review_consent(response)
    }

    /// Consent for `key` as visible to the requesting member. With scopes
    /// in `lookup`, consent must be granted for at least one of them.
    ///
    /// Returns `None` if nothing matches.
    pub async fn get_consent(
        &self,
        key: &str,
        lookup: &ConsentLookup,
    ) -> Result<Option<MemberConsentResponse>, ConsentError> {
        let requests = self.requests();
        let response = self.send(requests.build_get_consent(key, lookup)?).await?;
        requests.parse_get_consent(response)
    }

    /// Create or overwrite the consent for `key`.
    pub async fn save_consent(&self, key: &str, save: &SaveConsent) -> Result<ConsentInstance, ConsentError> {
        let requests = self.requests();
        let response = self.send(requests.build_save_consent(key, save)?).await?;
        requests.parse_save_consent(response)
    }

    /// Revoke the consent for `key`. Returns `false` if there was none.
    pub async fn delete_consent(&self, key: &str, member: Option<&str>) -> Result<bool, ConsentError> {
        let requests = self.requests();
        let response = self.send(requests.build_delete_consent(key, member)?).await?;
        requests.parse_delete_consent(response)
    }

    /// Groups managed by the configured subscription. Groups the
    /// subscription is merely a member of are not listed.
    pub async fn list_consent_groups(&self) -> Result<Vec<ConsentGroupSummary>, ConsentError> {
        let requests = self.requests();
        let response = self.send(requests.build_list_consent_groups()?).await?;
        requests.parse_list_consent_groups(response)
    }

    pub async fn get_consent_group(&self, group_id: Uuid) -> Result<Option<ConsentGroup>, ConsentError> {
        let requests = self.requests();
        let response = self.send(requests.build_get_consent_group(group_id)?).await?;
        requests.parse_get_consent_group(response)
    }

    pub async fn create_consent_group(&self, request: &ConsentGroupRequest) -> Result<ConsentGroup, ConsentError> {
        let requests = self.requests();
        let response = self.send(requests.build_create_consent_group(request)?).await?;
        requests.parse_create_consent_group(response)
    }

    /// Replace the group definition. Fails with `GroupNotFound` or
    /// `PermissionDenied` rather than a generic configuration error.
    pub async fn update_consent_group(
        &self,
        group_id: Uuid,
        request: &ConsentGroupRequest,
    ) -> Result<ConsentGroup, ConsentError> {
        let requests = self.requests();
        let response = self
            .send(requests.build_update_consent_group(group_id, request)?)
            .await?;
        requests.parse_update_consent_group(group_id, response)
    }

    fn requests(&self) -> &ConsentRequests {
        self.requests
            .get_or_init(|| ConsentRequests::with_base_url(self.base_url.clone(), &self.options))
    }

    async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, ConsentError> {
        let token = self.token_provider.access_token().await?;
        request
            .headers
            .push(("authorization".to_string(), format!("Bearer {token}")));

        let method = request.method;
        let url = request.url.clone();
        let response = self.transport.execute(request).await?;
        tracing::debug!(
            method = method.as_str(),
            %url,
            status = response.status,
            "consent service call"
        );
        Ok(response)
    }
}

/// Collects the three collaborators of a `ConsentClient` and checks them.
#[derive(Default)]
pub struct ConsentClientBuilder {
    transport: Option<Arc<dyn HttpTransport>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    options: Option<ConsentOptions>,
}

impl ConsentClientBuilder {
    /// The caller keeps ownership of the transport; the client only holds
    /// a shared reference.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn token_provider(mut self, token_provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(token_provider);
        self
    }

    pub fn options(mut self, options: ConsentOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> Result<ConsentClient, ConsentError> {
        let transport = self.transport.ok_or_else(|| missing("a transport"))?;
        let token_provider = self.token_provider.ok_or_else(|| missing("a token provider"))?;
        let options = self.options.ok_or_else(|| missing("options"))?;

        let base_url = options.base_url()?;
        if options.subscription_id.is_nil() {
            return Err(ConsentError::Configuration {
                message: "a subscription id is required".to_string(),
                body: None,
            });
        }

        Ok(ConsentClient {
            transport,
            token_provider,
            options,
            base_url,
            requests: OnceLock::new(),
        })
    }
}

fn missing(what: &str) -> ConsentError {
    ConsentError::Configuration {
        message: format!("consent client requires {what}"),
        body: None,
    }
}
