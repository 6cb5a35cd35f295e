//! Wire DTOs for the consent service and the named-parameter structs the
//! client methods take.
//!
//! # Design
//! These types mirror the service schema (camelCase JSON) and are defined
//! independently from the mock-server crate; integration tests catch any
//! schema drift between the two. Optional request fields are omitted from
//! the JSON when `None`, which the service reads as "all scopes" or "all
//! members".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConsentError, ValidationErrors};

/// Capability flags of a consent group member.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRoles {
    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_write: bool,
    #[serde(default)]
    pub can_delete: bool,
}

impl ConsentRoles {
    pub fn all() -> Self {
        Self {
            can_read: true,
            can_write: true,
            can_delete: true,
        }
    }

    pub fn read_only() -> Self {
        Self {
            can_read: true,
            ..Self::default()
        }
    }
}

/// A participant in a consent group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentGroupMember {
    pub key: String,
    pub name: String,
    pub subscription_id: Uuid,
    #[serde(default)]
    pub roles: ConsentRoles,
}

/// Full consent group detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentGroup {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_format: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub members: Vec<ConsentGroupMember>,
}

/// Element of the group listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentGroupSummary {
    pub id: Uuid,
    pub name: String,
}

/// Body of create and update group calls. Update is a full replace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentGroupRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    pub members: Vec<ConsentGroupMember>,
}

impl ConsentGroupRequest {
    pub fn new(name: impl Into<String>, members: Vec<ConsentGroupMember>) -> Self {
        Self {
            name: name.into(),
            key_format: None,
            scopes: None,
            members,
        }
    }

    pub fn with_key_format(mut self, key_format: impl Into<String>) -> Self {
        self.key_format = Some(key_format.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }
}

/// One saved consent grant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentInstance {
    pub id: Uuid,
    pub key: String,
    pub member: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub authorized_members: Vec<String>,
}

/// The consent visible to one member, restricted to the scopes it may see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberConsentResponse {
    pub key: String,
    pub member: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Body of the save consent call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    pub member: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_members: Option<Vec<String>>,
}

/// Optional parameters of `get_consent`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentLookup {
    /// Member requesting access; defaults to the configured member.
    pub member: Option<String>,
    /// Consent must be granted for at least one of these. `None` or empty
    /// means no filter.
    pub scopes: Option<Vec<String>>,
}

impl ConsentLookup {
    pub fn member(member: impl Into<String>) -> Self {
        Self {
            member: Some(member.into()),
            scopes: None,
        }
    }

    pub fn scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            member: None,
            scopes: Some(scopes.into_iter().map(Into::into).collect()),
        }
    }
}

/// Optional parameters of `save_consent`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveConsent {
    /// Member saving the consent; defaults to the configured member.
    pub member: Option<String>,
    /// Scopes granted. `None` grants all of the group's scopes.
    pub scopes: Option<Vec<String>>,
    /// Members allowed to read the consent. `None` authorizes every member.
    pub authorized_members: Option<Vec<String>>,
}

impl SaveConsent {
    pub fn scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: Some(scopes.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_authorized_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_members = Some(members.into_iter().map(Into::into).collect());
        self
    }
}

/// Decoded response of a write call: either the payload or the service's
/// field errors. Which one is decided from the status code alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentOutcome<T> {
    Ok(T),
    ValidationFailed(ValidationErrors),
}

impl<T> ConsentOutcome<T> {
    pub fn into_result(self) -> Result<T, ConsentError> {
        match self {
            ConsentOutcome::Ok(value) => Ok(value),
            ConsentOutcome::ValidationFailed(errors) => Err(ConsentError::validation(errors)),
        }
    }
}
