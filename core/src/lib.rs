//! Async client for the consent service.
//!
//! # Overview
//! Member systems of a consent group record, query and revoke the consent
//! a subject has given for a key, and manage the groups themselves.
//! `ConsentClient` does one HTTP round-trip per operation and maps status
//! codes to typed results.
//!
//! # Design
//! - `ConsentRequests` builds `HttpRequest` values and parses
//!   `HttpResponse` values without touching the network, so every status
//!   mapping is unit-testable.
//! - `HttpTransport` and `TokenProvider` are the two seams. `reqwest::Client`
//!   implements the former; `StaticTokenProvider` and
//!   `ClientCredentialsTokenProvider` implement the latter.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod options;
pub mod requests;
pub mod types;

pub use auth::{ClientCredentialsOptions, ClientCredentialsTokenProvider, StaticTokenProvider, TokenProvider};
pub use client::{ConsentClient, ConsentClientBuilder};
pub use error::{ConsentError, TokenError, TransportError, ValidationErrors};
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
pub use options::{ConsentOptions, DEFAULT_CONSENT_SERVICE_URI};
pub use requests::ConsentRequests;
pub use types::{
    ConsentGroup, ConsentGroupMember, ConsentGroupRequest, ConsentGroupSummary, ConsentInstance, ConsentLookup,
    ConsentOutcome, ConsentRequest, ConsentRoles, MemberConsentResponse, SaveConsent,
};
