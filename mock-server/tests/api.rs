use axum::http::{self, Request, StatusCode};
use consent_mock_server::{app, Consent, Group, GroupSummary, MemberConsent, TokenResponse};
use http_body_util::BodyExt;
use tower::{Service, ServiceExt};

const SUBSCRIPTION: &str = "11111111-1111-1111-1111-111111111111";
const OTHER_SUBSCRIPTION: &str = "33333333-3333-3333-3333-333333333333";

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, "Bearer test-token")
        .body(String::new())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, "Bearer test-token")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn group_body(name: &str) -> String {
    format!(
        r#"{{"name":"{name}","keyFormat":"[0-9]{{10}}","scopes":["read","write"],"members":[
            {{"key":"Acme","name":"Acme","subscriptionId":"{SUBSCRIPTION}","roles":{{"canRead":true,"canWrite":true,"canDelete":true}}}},
            {{"key":"Partner","name":"Partner","subscriptionId":"{OTHER_SUBSCRIPTION}","roles":{{"canRead":true}}}}
        ]}}"#
    )
}

type App = axum::routing::RouterIntoService<String>;

async fn call(app: &mut App, request: Request<String>) -> axum::response::Response {
    ServiceExt::ready(app).await.unwrap().call(request).await.unwrap()
}

async fn create_group(app: &mut App) -> Group {
    let resp = call(
        app,
        json_request(
            "POST",
            &format!("/subscriptions/{SUBSCRIPTION}/consentgroups"),
            &group_body("Acme Group"),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

// --- auth ---

#[tokio::test]
async fn missing_bearer_token_returns_401() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri(format!("/subscriptions/{SUBSCRIPTION}/consentgroups"))
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blank_bearer_token_returns_401() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri(format!("/subscriptions/{SUBSCRIPTION}/consentgroups"))
                .header(http::header::AUTHORIZATION, "Bearer   ")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_endpoint_issues_bearer_token() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth2/token")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body("grant_type=client_credentials&client_id=sample&client_secret=s3cret".to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let token: TokenResponse = body_json(resp).await;
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.expires_in, 3600);
    assert!(!token.access_token.is_empty());
}

#[tokio::test]
async fn token_endpoint_rejects_other_grants() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/oauth2/token")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body("grant_type=password&client_id=sample&client_secret=s3cret".to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"], "unsupported_grant_type");
}

// --- groups ---

#[tokio::test]
async fn list_groups_empty() {
    let resp = app()
        .oneshot(request("GET", &format!("/subscriptions/{SUBSCRIPTION}/consentgroups")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let groups: Vec<GroupSummary> = body_json(resp).await;
    assert!(groups.is_empty());
}

#[tokio::test]
async fn create_group_blank_name_returns_field_errors() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            &format!("/subscriptions/{SUBSCRIPTION}/consentgroups"),
            &group_body(""),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body, serde_json::json!({ "Name": ["required"] }));
}

#[tokio::test]
async fn get_group_bad_uuid_returns_400() {
    let resp = app()
        .oneshot(request(
            "GET",
            &format!("/subscriptions/{SUBSCRIPTION}/consentgroups/not-a-uuid"),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_unknown_group_returns_404() {
    let resp = app()
        .oneshot(json_request(
            "PUT",
            &format!("/subscriptions/{SUBSCRIPTION}/consentgroups/00000000-0000-0000-0000-000000000000"),
            &group_body("G"),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn groups_are_owned_by_their_subscription() {
    let mut app = app().into_service();
    let group = create_group(&mut app).await;

    // another subscription neither lists, reads nor updates it
    let resp = call(&mut app, request("GET", &format!("/subscriptions/{OTHER_SUBSCRIPTION}/consentgroups"))).await;
    let groups: Vec<GroupSummary> = body_json(resp).await;
    assert!(groups.is_empty());

    let other_uri = format!("/subscriptions/{OTHER_SUBSCRIPTION}/consentgroups/{}", group.id);
    let resp = call(&mut app, request("GET", &other_uri)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = call(&mut app, json_request("PUT", &other_uri, &group_body("Hijacked"))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // the owner can
    let uri = format!("/subscriptions/{SUBSCRIPTION}/consentgroups/{}", group.id);
    let resp = call(&mut app, json_request("PUT", &uri, &group_body("Renamed"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Group = body_json(resp).await;
    assert_eq!(updated.id, group.id);
    assert_eq!(updated.name, "Renamed");

    let resp = call(&mut app, request("GET", &format!("/subscriptions/{SUBSCRIPTION}/consentgroups"))).await;
    let groups: Vec<GroupSummary> = body_json(resp).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Renamed");
}

// --- consents ---

#[tokio::test]
async fn consent_lifecycle() {
    let mut app = app().into_service();
    let group = create_group(&mut app).await;
    let consent_uri = format!("/subscriptions/{SUBSCRIPTION}/consents/{}/1234567890", group.id);

    // nothing saved yet
    let resp = call(&mut app, request("GET", &format!("{consent_uri}?member=Acme"))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // save creates
    let resp = call(
        &mut app,
        json_request("PUT", &consent_uri, r#"{"member":"Acme","scopes":["read"]}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Consent = body_json(resp).await;
    assert_eq!(created.scopes, vec!["read"]);
    assert_eq!(created.authorized_members, vec!["Acme", "Partner"]);

    // save again overwrites and keeps the id
    let resp = call(
        &mut app,
        json_request("PUT", &consent_uri, r#"{"member":"Acme","scopes":["read","write"]}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let overwritten: Consent = body_json(resp).await;
    assert_eq!(overwritten.id, created.id);
    assert_eq!(overwritten.scopes, vec!["read", "write"]);

    // review
    let resp = call(&mut app, request("GET", &format!("{consent_uri}?member=Acme"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let reviewed: Consent = body_json(resp).await;
    assert_eq!(reviewed, overwritten);

    // partner sees the consent through its own subscription, filtered by scope
    let partner_uri = format!(
        "/subscriptions/{OTHER_SUBSCRIPTION}/consents/{}/1234567890/Partner?scopes=write",
        group.id
    );
    let resp = call(&mut app, request("GET", &partner_uri)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let visible: MemberConsent = body_json(resp).await;
    assert_eq!(visible.member, "Partner");
    assert_eq!(visible.scopes, vec!["write"]);

    // delete, then delete again
    let resp = call(&mut app, request("DELETE", &format!("{consent_uri}?member=Acme"))).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());
    let resp = call(&mut app, request("DELETE", &format!("{consent_uri}?member=Acme"))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = call(&mut app, request("GET", &partner_uri)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn member_get_with_unmatched_scope_returns_404() {
    let mut app = app().into_service();
    let group = create_group(&mut app).await;
    let consent_uri = format!("/subscriptions/{SUBSCRIPTION}/consents/{}/1234567890", group.id);
    call(
        &mut app,
        json_request("PUT", &consent_uri, r#"{"member":"Acme","scopes":["read"]}"#),
    )
    .await;

    let resp = call(&mut app, request("GET", &format!("{consent_uri}/Acme?scopes=write"))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = call(&mut app, request("GET", &format!("{consent_uri}/Acme"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let visible: MemberConsent = body_json(resp).await;
    assert_eq!(visible.scopes, vec!["read"]);
}

#[tokio::test]
async fn save_rejects_key_not_matching_format() {
    let mut app = app().into_service();
    let group = create_group(&mut app).await;
    let resp = call(
        &mut app,
        json_request(
            "PUT",
            &format!("/subscriptions/{SUBSCRIPTION}/consents/{}/abc", group.id),
            r#"{"member":"Acme"}"#,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = body_json(resp).await;
    assert!(body.get("Key").is_some());
}

#[tokio::test]
async fn review_requires_read_and_write_roles() {
    let mut app = app().into_service();
    let group = create_group(&mut app).await;
    let resp = call(
        &mut app,
        request(
            "GET",
            &format!(
                "/subscriptions/{OTHER_SUBSCRIPTION}/consents/{}/1234567890?member=Partner",
                group.id
            ),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = body_json(resp).await;
    assert!(body.get("Member").is_some());
}

#[tokio::test]
async fn consents_of_unknown_group_return_404() {
    let resp = app()
        .oneshot(request(
            "GET",
            &format!(
                "/subscriptions/{SUBSCRIPTION}/consents/00000000-0000-0000-0000-000000000000/k?member=Acme"
            ),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
