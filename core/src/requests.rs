//! Request builder and response parser for the consent API.
//!
//! # Design
//! `ConsentRequests` holds only the configured base URL, subscription,
//! group and member. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. Nothing here performs I/O, so the status-code mapping
//! can be tested against plain response values.
//!
//! Required parameters are checked in `build_*`; a blank key or member, or
//! one that is a `.`/`..` path segment, is reported as
//! `ConsentError::Validation`, the same kind a 400 from the service produces.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{ConsentError, ValidationErrors};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::options::ConsentOptions;
use crate::types::{
    ConsentGroup, ConsentGroupRequest, ConsentGroupSummary, ConsentInstance, ConsentLookup,
    ConsentOutcome, ConsentRequest, MemberConsentResponse, SaveConsent,
};

/// Stateless builder/parser for every consent service call.
#[derive(Debug, Clone)]
pub struct ConsentRequests {
    base_url: Url,
    subscription_id: Uuid,
    consent_group_id: Uuid,
    consent_member: String,
}

impl ConsentRequests {
    pub fn new(options: &ConsentOptions) -> Result<Self, ConsentError> {
        Ok(Self::with_base_url(options.base_url()?, options))
    }

    pub(crate) fn with_base_url(base_url: Url, options: &ConsentOptions) -> Self {
        Self {
            base_url,
            subscription_id: options.subscription_id,
            consent_group_id: options.consent_group_id,
            consent_member: options.consent_member.clone(),
        }
    }

    pub fn subscription_id(&self) -> Uuid {
        self.subscription_id
    }

    pub fn consent_group_id(&self) -> Uuid {
        self.consent_group_id
    }

    // -- consents ------------------------------------------------------------

    pub fn build_review_consent(&self, key: &str, member: Option<&str>) -> Result<HttpRequest, ConsentError> {
        let member = self.resolve_member(member)?;
        let mut url = self.consent_url(key, None)?;
        url.query_pairs_mut().append_pair("member", member);
        Ok(get(url))
    }

    pub fn build_get_consent(&self, key: &str, lookup: &ConsentLookup) -> Result<HttpRequest, ConsentError> {
        let member = self.resolve_member(lookup.member.as_deref())?;
        let mut url = self.consent_url(key, Some(member))?;
        if let Some(scopes) = lookup.scopes.as_ref().filter(|s| !s.is_empty()) {
            url.query_pairs_mut().append_pair("scopes", &scopes.join(" "));
        }
        Ok(get(url))
    }

    pub fn build_save_consent(&self, key: &str, save: &SaveConsent) -> Result<HttpRequest, ConsentError> {
        let member = self.resolve_member(save.member.as_deref())?;
        let url = self.consent_url(key, None)?;
        let body = ConsentRequest {
            member: member.to_string(),
            scopes: save.scopes.clone(),
            authorized_members: save.authorized_members.clone(),
        };
        json(HttpMethod::Put, url, &body)
    }

    pub fn build_delete_consent(&self, key: &str, member: Option<&str>) -> Result<HttpRequest, ConsentError> {
        let member = self.resolve_member(member)?;
        let mut url = self.consent_url(key, None)?;
        url.query_pairs_mut().append_pair("member", member);
        Ok(HttpRequest {
            method: HttpMethod::Delete,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        })
    }

    // -- consent groups ------------------------------------------------------

    pub fn build_list_consent_groups(&self) -> Result<HttpRequest, ConsentError> {
        Ok(get(self.group_url(None)?))
    }

    pub fn build_get_consent_group(&self, group_id: Uuid) -> Result<HttpRequest, ConsentError> {
        Ok(get(self.group_url(Some(group_id))?))
    }

    pub fn build_create_consent_group(&self, request: &ConsentGroupRequest) -> Result<HttpRequest, ConsentError> {
        require("name", &request.name)?;
        json(HttpMethod::Post, self.group_url(None)?, request)
    }

    pub fn build_update_consent_group(
        &self,
        group_id: Uuid,
        request: &ConsentGroupRequest,
    ) -> Result<HttpRequest, ConsentError> {
        require("name", &request.name)?;
        json(HttpMethod::Put, self.group_url(Some(group_id))?, request)
    }

    // -- parsing -------------------------------------------------------------

    pub fn parse_review_consent(&self, response: HttpResponse) -> Result<Option<ConsentInstance>, ConsentError> {
        match response.status {
            200 => decode(&response.body).map(Some),
            404 => Ok(None),
            400 => Err(ConsentError::validation(decode_validation(&response.body))),
            _ => Err(ConsentError::configuration(&response.body)),
        }
    }

    pub fn parse_get_consent(&self, response: HttpResponse) -> Result<Option<MemberConsentResponse>, ConsentError> {
        match response.status {
            200 => decode(&response.body).map(Some),
            404 => Ok(None),
            _ => Err(ConsentError::configuration(&response.body)),
        }
    }

    pub fn parse_save_consent(&self, response: HttpResponse) -> Result<ConsentInstance, ConsentError> {
        write_outcome(&response)?.into_result()
    }

    /// `true` if consent was revoked, `false` if none existed for the key.
    pub fn parse_delete_consent(&self, response: HttpResponse) -> Result<bool, ConsentError> {
        match response.status {
            200 | 204 => Ok(true),
            404 => Ok(false),
            _ => Err(ConsentError::configuration(&response.body)),
        }
    }

    pub fn parse_list_consent_groups(&self, response: HttpResponse) -> Result<Vec<ConsentGroupSummary>, ConsentError> {
        match response.status {
            200 => decode(&response.body),
            status => Err(ConsentError::Http {
                status,
                body: response.body,
            }),
        }
    }

    pub fn parse_get_consent_group(&self, response: HttpResponse) -> Result<Option<ConsentGroup>, ConsentError> {
        match response.status {
            200 => decode(&response.body).map(Some),
            404 => Ok(None),
            _ => Err(ConsentError::configuration(&response.body)),
        }
    }

    pub fn parse_create_consent_group(&self, response: HttpResponse) -> Result<ConsentGroup, ConsentError> {
        write_outcome(&response)?.into_result()
    }

    pub fn parse_update_consent_group(
        &self,
        group_id: Uuid,
        response: HttpResponse,
    ) -> Result<ConsentGroup, ConsentError> {
        match response.status {
            404 => Err(ConsentError::GroupNotFound { group_id }),
            401 => Err(ConsentError::PermissionDenied { group_id }),
            _ => write_outcome(&response)?.into_result(),
        }
    }

    // -- helpers -------------------------------------------------------------

    fn resolve_member<'a>(&'a self, member: Option<&'a str>) -> Result<&'a str, ConsentError> {
        let member = member.unwrap_or(&self.consent_member);
        path_segment("member", member)?;
        Ok(member)
    }

    /// `.../consents/{group}/{key}` or `.../consents/{group}/{key}/{member}`.
    fn consent_url(&self, key: &str, member: Option<&str>) -> Result<Url, ConsentError> {
        path_segment("key", key)?;
        if self.consent_group_id.is_nil() {
            return Err(ConsentError::invalid_field(
                "consentGroupId",
                "a consent group must be configured",
            ));
        }
        let subscription = self.subscription_id.to_string();
        let group = self.consent_group_id.to_string();
        let mut segments = vec!["subscriptions", subscription.as_str(), "consents", group.as_str(), key];
        segments.extend(member);
        self.endpoint(&segments)
    }

    fn group_url(&self, group_id: Option<Uuid>) -> Result<Url, ConsentError> {
        let subscription = self.subscription_id.to_string();
        let group = group_id.map(|id| id.to_string());
        let mut segments = vec!["subscriptions", subscription.as_str(), "consentgroups"];
        segments.extend(group.as_deref());
        self.endpoint(&segments)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ConsentError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ConsentError::Configuration {
                message: format!("consent service uri '{}' cannot be a base", self.base_url),
                body: None,
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn require(field: &str, value: &str) -> Result<(), ConsentError> {
    if value.trim().is_empty() {
        return Err(ConsentError::invalid_field(field, &format!("{field} is required")));
    }
    Ok(())
}

/// A value that becomes a single path segment. `.` and `..` would be
/// dropped by URL normalization and address a different route.
fn path_segment(field: &str, value: &str) -> Result<(), ConsentError> {
    require(field, value)?;
    if value == "." || value == ".." {
        return Err(ConsentError::invalid_field(field, &format!("{field} cannot be '{value}'")));
    }
    Ok(())
}

fn get(url: Url) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Get,
        url: url.into(),
        headers: Vec::new(),
        body: None,
    }
}

fn json<T: Serialize>(method: HttpMethod, url: Url, body: &T) -> Result<HttpRequest, ConsentError> {
    let body = serde_json::to_string(body).map_err(|e| ConsentError::Serialization(e.to_string()))?;
    Ok(HttpRequest {
        method,
        url: url.into(),
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: Some(body),
    })
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ConsentError> {
    serde_json::from_str(body).map_err(|e| ConsentError::Deserialization(e.to_string()))
}

/// Status-driven decoding shared by the write calls: 200/201 carry the
/// payload, 400 carries field errors, anything else is a configuration
/// error.
fn write_outcome<T: DeserializeOwned>(response: &HttpResponse) -> Result<ConsentOutcome<T>, ConsentError> {
    match response.status {
        200 | 201 => decode(&response.body).map(ConsentOutcome::Ok),
        400 => Ok(ConsentOutcome::ValidationFailed(decode_validation(&response.body))),
        _ => Err(ConsentError::configuration(&response.body)),
    }
}

#[derive(Deserialize)]
struct ProblemDetails {
    errors: ValidationErrors,
}

/// Accepts a bare `field -> [message]` object or a problem-details body
/// with an `errors` member. Anything else yields an empty map.
fn decode_validation(body: &str) -> ValidationErrors {
    if let Ok(errors) = serde_json::from_str::<ValidationErrors>(body) {
        return errors;
    }
    serde_json::from_str::<ProblemDetails>(body)
        .map(|p| p.errors)
        .unwrap_or_default()
}
