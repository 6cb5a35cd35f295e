//! In-memory stand-in for the consent service.
//!
//! Groups belong to the subscription that created them. Consent records are
//! keyed by group, key and the member that saved them. Every route except
//! the token endpoint requires a non-blank bearer token; the token itself is
//! not checked.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roles {
    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_write: bool,
    #[serde(default)]
    pub can_delete: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub key: String,
    pub name: String,
    pub subscription_id: Uuid,
    #[serde(default)]
    pub roles: Roles,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_format: Option<String>,
    pub scopes: Vec<String>,
    pub members: Vec<Member>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInput {
    #[serde(default)]
    pub name: String,
    pub key_format: Option<String>,
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub id: Uuid,
    pub key: String,
    pub member: String,
    pub scopes: Vec<String>,
    pub authorized_members: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentInput {
    #[serde(default)]
    pub member: String,
    pub scopes: Option<Vec<String>>,
    pub authorized_members: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConsent {
    pub key: String,
    pub member: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemberQuery {
    pub member: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScopesQuery {
    pub scopes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenForm {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

struct OwnedGroup {
    owner: Uuid,
    group: Group,
}

#[derive(Default)]
pub struct Store {
    groups: HashMap<Uuid, OwnedGroup>,
    consents: HashMap<(Uuid, String, String), Consent>,
}

pub type Db = Arc<RwLock<Store>>;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Error responses. `Invalid` renders as a `field -> [message]` body.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Unauthorized,
    Invalid(FieldErrors),
}

impl ApiError {
    fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Invalid(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            ApiError::Invalid(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
        }
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));

    let api = Router::new()
        .route(
            "/subscriptions/{subscription_id}/consentgroups",
            get(list_groups).post(create_group),
        )
        .route(
            "/subscriptions/{subscription_id}/consentgroups/{group_id}",
            get(get_group).put(update_group),
        )
        .route(
            "/subscriptions/{subscription_id}/consents/{group_id}/{key}",
            get(review_consent).put(save_consent).delete(delete_consent),
        )
        .route(
            "/subscriptions/{subscription_id}/consents/{group_id}/{key}/{member}",
            get(get_member_consent),
        )
        .route_layer(middleware::from_fn(require_bearer));

    Router::new()
        .merge(api)
        .route("/oauth2/token", post(issue_token))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_bearer(request: Request, next: Next) -> Response {
    let has_token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .is_some_and(|(scheme, token)| scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty());
    if !has_token {
        tracing::debug!(uri = %request.uri(), "rejected request without bearer token");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(request).await
}

async fn issue_token(Form(form): Form<TokenForm>) -> Response {
    if form.grant_type != "client_credentials" {
        return token_error("unsupported_grant_type");
    }
    if form.client_id.trim().is_empty() || form.client_secret.trim().is_empty() {
        return token_error("invalid_client");
    }
    tracing::info!(client_id = %form.client_id, scope = ?form.scope, "issued token");
    Json(TokenResponse {
        access_token: format!("mock-{}", Uuid::new_v4()),
        token_type: "Bearer".to_string(),
        expires_in: TOKEN_LIFETIME_SECS,
    })
    .into_response()
}

fn token_error(error: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": error }))).into_response()
}

// --- groups ---

async fn list_groups(State(db): State<Db>, Path(subscription_id): Path<Uuid>) -> Json<Vec<GroupSummary>> {
    let store = db.read().await;
    let mut groups: Vec<GroupSummary> = store
        .groups
        .values()
        .filter(|g| g.owner == subscription_id)
        .map(|g| GroupSummary {
            id: g.group.id,
            name: g.group.name.clone(),
        })
        .collect();
    groups.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Json(groups)
}

async fn create_group(
    State(db): State<Db>,
    Path(subscription_id): Path<Uuid>,
    Json(input): Json<GroupInput>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    validate_group(&input)?;
    let group = into_group(Uuid::new_v4(), input);
    db.write().await.groups.insert(
        group.id,
        OwnedGroup {
            owner: subscription_id,
            group: group.clone(),
        },
    );
    tracing::info!(%subscription_id, group_id = %group.id, name = %group.name, "created consent group");
    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group(
    State(db): State<Db>,
    Path((subscription_id, group_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Group>, ApiError> {
    let store = db.read().await;
    store
        .groups
        .get(&group_id)
        .filter(|g| g.owner == subscription_id)
        .map(|g| Json(g.group.clone()))
        .ok_or(ApiError::NotFound)
}

async fn update_group(
    State(db): State<Db>,
    Path((subscription_id, group_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<GroupInput>,
) -> Result<Json<Group>, ApiError> {
    let mut store = db.write().await;
    let owned = store.groups.get_mut(&group_id).ok_or(ApiError::NotFound)?;
    if owned.owner != subscription_id {
        return Err(ApiError::Unauthorized);
    }
    validate_group(&input)?;
    owned.group = into_group(group_id, input);
    tracing::info!(%subscription_id, %group_id, "updated consent group");
    Ok(Json(owned.group.clone()))
}

/// Field errors for a group definition, keyed the way the service reports
/// them.
pub fn validate_group(input: &GroupInput) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if input.name.trim().is_empty() {
        errors.entry("Name".into()).or_default().push("required".into());
    }
    if input.members.is_empty() {
        errors
            .entry("Members".into())
            .or_default()
            .push("at least one member is required".into());
    }
    let mut seen = BTreeSet::new();
    for member in &input.members {
        if member.key.trim().is_empty() {
            errors
                .entry("Members".into())
                .or_default()
                .push("member key is required".into());
        } else if !seen.insert(member.key.as_str()) {
            errors
                .entry("Members".into())
                .or_default()
                .push(format!("duplicate member key '{}'", member.key));
        }
    }
    if let Some(format) = input.key_format.as_deref() {
        if key_pattern(format).is_err() {
            errors
                .entry("KeyFormat".into())
                .or_default()
                .push("not a valid regular expression".into());
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Invalid(errors))
    }
}

fn into_group(id: Uuid, input: GroupInput) -> Group {
    Group {
        id,
        name: input.name,
        key_format: input.key_format.filter(|f| !f.is_empty()),
        scopes: input.scopes.unwrap_or_default(),
        members: input.members,
    }
}

/// Key formats must match the whole key.
pub fn key_pattern(format: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{format})$"))
}

// --- consents ---

/// The group behind a consent route, visible to its owner and to the
/// subscriptions of its members.
fn visible_group(store: &Store, subscription_id: Uuid, group_id: Uuid) -> Result<&Group, ApiError> {
    store
        .groups
        .get(&group_id)
        .filter(|g| g.owner == subscription_id || g.group.members.iter().any(|m| m.subscription_id == subscription_id))
        .map(|g| &g.group)
        .ok_or(ApiError::NotFound)
}

fn find_member<'a>(group: &'a Group, key: &str) -> Option<&'a Member> {
    group.members.iter().find(|m| m.key == key)
}

fn required_member(query: MemberQuery) -> Result<String, ApiError> {
    query
        .member
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::field("Member", "required"))
}

async fn review_consent(
    State(db): State<Db>,
    Path((subscription_id, group_id, key)): Path<(Uuid, Uuid, String)>,
    Query(query): Query<MemberQuery>,
) -> Result<Json<Consent>, ApiError> {
    let member = required_member(query)?;
    let store = db.read().await;
    let group = visible_group(&store, subscription_id, group_id)?;
    match find_member(group, &member) {
        Some(m) if m.roles.can_read && m.roles.can_write => {}
        _ => return Err(ApiError::field("Member", "read and write permission required to review consent")),
    }
    store
        .consents
        .get(&(group_id, key, member))
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn save_consent(
    State(db): State<Db>,
    Path((subscription_id, group_id, key)): Path<(Uuid, Uuid, String)>,
    Json(input): Json<ConsentInput>,
) -> Result<(StatusCode, Json<Consent>), ApiError> {
    let mut store = db.write().await;
    let group = visible_group(&store, subscription_id, group_id)?;
    let (scopes, authorized_members) = validate_consent(group, &key, input.member.as_str(), &input)?;

    let record_key = (group_id, key.clone(), input.member.clone());
    let (status, id) = match store.consents.get(&record_key) {
        Some(existing) => (StatusCode::OK, existing.id),
        None => (StatusCode::CREATED, Uuid::new_v4()),
    };
    let consent = Consent {
        id,
        key,
        member: input.member,
        scopes,
        authorized_members,
    };
    store.consents.insert(record_key, consent.clone());
    let created = status == StatusCode::CREATED;
    tracing::debug!(%group_id, key = %consent.key, member = %consent.member, created, "saved consent");
    Ok((status, Json(consent)))
}

/// Resolves the scopes and authorized members a save stores, or the field
/// errors explaining why it is rejected.
pub fn validate_consent(
    group: &Group,
    key: &str,
    member: &str,
    input: &ConsentInput,
) -> Result<(Vec<String>, Vec<String>), ApiError> {
    let mut errors = FieldErrors::new();

    match find_member(group, member) {
        None => errors
            .entry("Member".into())
            .or_default()
            .push(format!("'{member}' is not a member of the consent group")),
        Some(m) if !m.roles.can_write => errors
            .entry("Member".into())
            .or_default()
            .push(format!("'{member}' may not write consent")),
        Some(_) => {}
    }

    if let Some(format) = group.key_format.as_deref() {
        if !key_pattern(format).is_ok_and(|re| re.is_match(key)) {
            errors
                .entry("Key".into())
                .or_default()
                .push(format!("does not match the key format '{format}'"));
        }
    }

    let scopes = input.scopes.clone().unwrap_or_else(|| group.scopes.clone());
    if !group.scopes.is_empty() {
        for scope in scopes.iter().filter(|s| !group.scopes.contains(s)) {
            errors
                .entry("Scopes".into())
                .or_default()
                .push(format!("unknown scope '{scope}'"));
        }
    }

    let authorized_members = input
        .authorized_members
        .clone()
        .unwrap_or_else(|| group.members.iter().map(|m| m.key.clone()).collect());
    for authorized in authorized_members.iter().filter(|a| find_member(group, a).is_none()) {
        errors
            .entry("AuthorizedMembers".into())
            .or_default()
            .push(format!("'{authorized}' is not a member of the consent group"));
    }

    if errors.is_empty() {
        Ok((scopes, authorized_members))
    } else {
        Err(ApiError::Invalid(errors))
    }
}

async fn get_member_consent(
    State(db): State<Db>,
    Path((subscription_id, group_id, key, member)): Path<(Uuid, Uuid, String, String)>,
    Query(query): Query<ScopesQuery>,
) -> Result<Json<MemberConsent>, ApiError> {
    let store = db.read().await;
    let group = visible_group(&store, subscription_id, group_id)?;
    if !find_member(group, &member).is_some_and(|m| m.roles.can_read) {
        return Err(ApiError::NotFound);
    }

    let requested: Vec<&str> = query.scopes.as_deref().unwrap_or("").split_whitespace().collect();
    let granted: BTreeSet<&str> = store
        .consents
        .iter()
        .filter(|((g, k, _), c)| *g == group_id && *k == key && c.authorized_members.contains(&member))
        .flat_map(|(_, c)| c.scopes.iter().map(String::as_str))
        .filter(|scope| requested.is_empty() || requested.contains(scope))
        .collect();
    if granted.is_empty() {
        return Err(ApiError::NotFound);
    }

    Ok(Json(MemberConsent {
        key,
        member,
        scopes: granted.into_iter().map(str::to_string).collect(),
    }))
}

async fn delete_consent(
    State(db): State<Db>,
    Path((subscription_id, group_id, key)): Path<(Uuid, Uuid, String)>,
    Query(query): Query<MemberQuery>,
) -> Result<StatusCode, ApiError> {
    let member = required_member(query)?;
    let mut store = db.write().await;
    let group = visible_group(&store, subscription_id, group_id)?;
    if find_member(group, &member).is_some_and(|m| !m.roles.can_delete) {
        return Err(ApiError::field("Member", format!("'{member}' may not delete consent")));
    }
    store
        .consents
        .remove(&(group_id, key, member))
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(key: &str, roles: Roles) -> Member {
        Member {
            key: key.to_string(),
            name: key.to_string(),
            subscription_id: Uuid::nil(),
            roles,
        }
    }

    fn all_roles() -> Roles {
        Roles {
            can_read: true,
            can_write: true,
            can_delete: true,
        }
    }

    fn group(key_format: Option<&str>, scopes: &[&str]) -> Group {
        Group {
            id: Uuid::nil(),
            name: "G".into(),
            key_format: key_format.map(str::to_string),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            members: vec![
                member("Acme", all_roles()),
                member(
                    "Reader",
                    Roles {
                        can_read: true,
                        ..Roles::default()
                    },
                ),
            ],
        }
    }

    fn input(member: &str, scopes: Option<&[&str]>) -> ConsentInput {
        ConsentInput {
            member: member.to_string(),
            scopes: scopes.map(|s| s.iter().map(|x| x.to_string()).collect()),
            authorized_members: None,
        }
    }

    fn field_errors(result: Result<(Vec<String>, Vec<String>), ApiError>) -> FieldErrors {
        match result {
            Err(ApiError::Invalid(errors)) => errors,
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[test]
    fn group_serializes_camel_case() {
        let json = serde_json::to_value(group(Some("[0-9]+"), &["read"])).unwrap();
        assert_eq!(json["keyFormat"], "[0-9]+");
        assert_eq!(json["members"][0]["subscriptionId"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["members"][1]["roles"]["canWrite"], false);
    }

    #[test]
    fn group_input_requires_name_and_members() {
        let input: GroupInput = serde_json::from_str(r#"{"name":"  "}"#).unwrap();
        match validate_group(&input) {
            Err(ApiError::Invalid(errors)) => {
                assert_eq!(errors["Name"], vec!["required".to_string()]);
                assert!(errors.contains_key("Members"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn group_input_rejects_bad_key_format_and_duplicates() {
        let input = GroupInput {
            name: "G".into(),
            key_format: Some("([".into()),
            scopes: None,
            members: vec![member("A", all_roles()), member("A", all_roles())],
        };
        match validate_group(&input) {
            Err(ApiError::Invalid(errors)) => {
                assert!(errors.contains_key("KeyFormat"));
                assert_eq!(errors["Members"], vec!["duplicate member key 'A'".to_string()]);
                assert!(!errors.contains_key("Name"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn key_pattern_matches_whole_key() {
        let re = key_pattern("[0-9]{10}").unwrap();
        assert!(re.is_match("1234567890"));
        assert!(!re.is_match("x1234567890"));
        assert!(!re.is_match("12345678901"));
    }

    #[test]
    fn consent_defaults_to_group_scopes_and_members() {
        let (scopes, authorized) =
            validate_consent(&group(None, &["read", "write"]), "k", "Acme", &input("Acme", None)).unwrap();
        assert_eq!(scopes, vec!["read", "write"]);
        assert_eq!(authorized, vec!["Acme", "Reader"]);
    }

    #[test]
    fn consent_rejects_unknown_scope_and_bad_key() {
        let errors = field_errors(validate_consent(
            &group(Some("[0-9]+"), &["read"]),
            "abc",
            "Acme",
            &input("Acme", Some(&["write"])),
        ));
        assert_eq!(errors["Scopes"], vec!["unknown scope 'write'".to_string()]);
        assert!(errors.contains_key("Key"));
    }

    #[test]
    fn consent_requires_writing_member() {
        let g = group(None, &[]);
        let errors = field_errors(validate_consent(&g, "k", "Nobody", &input("Nobody", None)));
        assert!(errors.contains_key("Member"));
        let errors = field_errors(validate_consent(&g, "k", "Reader", &input("Reader", None)));
        assert_eq!(errors["Member"], vec!["'Reader' may not write consent".to_string()]);
    }

    #[test]
    fn groups_without_scopes_accept_any_scope() {
        let (scopes, _) =
            validate_consent(&group(None, &[]), "k", "Acme", &input("Acme", Some(&["anything"]))).unwrap();
        assert_eq!(scopes, vec!["anything"]);
    }

    #[test]
    fn token_form_defaults_missing_fields() {
        let form: TokenForm = serde_json::from_str(r#"{"grant_type":"client_credentials"}"#).unwrap();
        assert!(form.client_id.is_empty());
        assert!(form.scope.is_none());
    }
}
