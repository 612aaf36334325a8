use super::*;
use mockito::Matcher;

const VERSIONS_PATH: &str = "/users/octo/packages/container/app/versions";

fn client(server: &mockito::Server) -> ControlClient {
    ControlClient::new(
        reqwest::Client::new(),
        &server.url(),
        "ghp_test",
        Operation::default(),
    )
    .unwrap()
}

fn version_json(id: i64, digest: &str, tags: &[&str], created: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": digest,
        "url": format!("https://api.github.com/x/{}", id),
        "package_html_url": "https://github.com/octo/app/pkgs/container/app",
        "created_at": created,
        "updated_at": created,
        "html_url": format!("https://github.com/octo/app/pkgs/container/app/{}", id),
        "metadata": {
            "package_type": "container",
            "container": { "tags": tags }
        }
    })
}

#[test]
fn test_owner_kind_serde_and_parse() {
    assert_eq!(
        serde_json::to_string(&OwnerKind::Organization).unwrap(),
        "\"organization\""
    );
    assert_eq!(OwnerKind::User.to_string(), "user");
    assert_eq!("org".parse::<OwnerKind>().unwrap(), OwnerKind::Organization);
    assert_eq!("User".parse::<OwnerKind>().unwrap(), OwnerKind::User);
    assert!("team".parse::<OwnerKind>().is_err());
    assert_eq!(OwnerKind::Organization.api_segment(), "orgs");
}

#[test]
fn test_version_record_from_api() {
    let value = version_json(7, "sha256:abc", &["v1", "latest"], "2025-01-15T10:00:00Z");
    let api: ApiVersion = serde_json::from_value(value).unwrap();
    let record = VersionRecord::from(api);
    assert_eq!(record.id, 7);
    assert_eq!(record.digest, "sha256:abc");
    assert_eq!(record.tags, vec!["v1", "latest"]);
    assert_eq!(record.media_type, "");
    assert!(record.has_tag("latest"));
    assert!(!record.has_tag("v2"));
}

#[test]
fn test_version_record_without_metadata() {
    let api: ApiVersion =
        serde_json::from_str(r#"{"id": 3, "name": "sha256:def"}"#).unwrap();
    let record = VersionRecord::from(api);
    assert!(record.tags.is_empty());
    assert_eq!(record.created_at, "");
    assert_eq!(record.html_url, "");
}

#[tokio::test]
async fn test_classify_user_is_memoized() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/users/octo")
        .match_header("authorization", "Bearer ghp_test")
        .match_header("accept", "application/vnd.github+json")
        .match_header("x-github-api-version", "2022-11-28")
        .with_status(200)
        .with_body(r#"{"login":"octo","type":"User"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client(&server);
    assert_eq!(client.classify_owner("octo").await.unwrap(), OwnerKind::User);
    assert_eq!(client.classify_owner("Octo").await.unwrap(), OwnerKind::User);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_classify_organization_from_users_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/users/acme")
        .with_status(200)
        .with_body(r#"{"login":"acme","type":"Organization"}"#)
        .create_async()
        .await;

    let client = client(&server);
    assert_eq!(
        client.classify_owner("acme").await.unwrap(),
        OwnerKind::Organization
    );
}

#[tokio::test]
async fn test_classify_falls_back_to_orgs() {
    let mut server = mockito::Server::new_async().await;
    let users = server
        .mock("GET", "/users/acme")
        .with_status(404)
        .create_async()
        .await;
    let orgs = server
        .mock("GET", "/orgs/acme")
        .with_status(200)
        .with_body(r#"{"login":"acme"}"#)
        .create_async()
        .await;

    let client = client(&server);
    assert_eq!(
        client.classify_owner("acme").await.unwrap(),
        OwnerKind::Organization
    );
    users.assert_async().await;
    orgs.assert_async().await;
}

#[tokio::test]
async fn test_classify_owner_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _users = server
        .mock("GET", "/users/ghost")
        .with_status(404)
        .create_async()
        .await;
    let _orgs = server
        .mock("GET", "/orgs/ghost")
        .with_status(404)
        .create_async()
        .await;

    let err = client(&server).classify_owner("ghost").await.unwrap_err();
    assert_eq!(err.kind(), "OwnerNotFound");
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn test_remember_owner_skips_probe() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/users/acme")
        .expect(0)
        .create_async()
        .await;

    let client = client(&server);
    client.remember_owner("acme", OwnerKind::Organization);
    assert_eq!(
        client.owner_kind("acme").await.unwrap(),
        OwnerKind::Organization
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_versions_follows_pagination() {
    let mut server = mockito::Server::new_async().await;
    let page1 = serde_json::json!([
        version_json(1, "sha256:aaa", &["v1.0.0", "latest"], "2025-01-15T10:00:00Z"),
        version_json(2, "sha256:bbb", &["v0.9.0"], "2025-01-10T10:00:00Z"),
    ]);
    let page2 = serde_json::json!([version_json(3, "sha256:ccc", &[], "2025-01-05T10:00:00Z")]);

    let first = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Exact("per_page=100".into()))
        .with_status(200)
        .with_header(
            "link",
            &format!(
                r#"<{}?per_page=100&page=2>; rel="next", <{}?per_page=100&page=2>; rel="last""#,
                VERSIONS_PATH, VERSIONS_PATH
            ),
        )
        .with_body(page1.to_string())
        .create_async()
        .await;
    let second = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Exact("per_page=100&page=2".into()))
        .with_status(200)
        .with_body(page2.to_string())
        .create_async()
        .await;

    let records = client(&server)
        .list_versions("octo", OwnerKind::User, "app")
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(records[0].tags, vec!["v1.0.0", "latest"]);
}

#[tokio::test]
async fn test_list_versions_follows_absolute_link() {
    let mut server = mockito::Server::new_async().await;
    let next = format!("{}{}?per_page=100&page=2", server.url(), VERSIONS_PATH);
    let _first = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Exact("per_page=100".into()))
        .with_status(200)
        .with_header("link", &format!(r#"<{}>; rel="next""#, next))
        .with_body("[]")
        .create_async()
        .await;
    let second = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Exact("per_page=100&page=2".into()))
        .with_status(200)
        .with_body(
            serde_json::json!([version_json(9, "sha256:fff", &[], "2025-01-01T00:00:00Z")])
                .to_string(),
        )
        .create_async()
        .await;

    let records = client(&server)
        .list_versions("octo", OwnerKind::User, "app")
        .await
        .unwrap();
    second.assert_async().await;
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_list_versions_org_path() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/orgs/acme/packages/container/app/versions")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let records = client(&server)
        .list_versions("acme", OwnerKind::Organization, "app")
        .await
        .unwrap();
    mock.assert_async().await;
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_list_versions_package_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"message":"Package not found."}"#)
        .create_async()
        .await;

    let err = client(&server)
        .list_versions("octo", OwnerKind::User, "app")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "PackageNotFound");
    assert!(err.to_string().contains("octo/app"));
}

#[tokio::test]
async fn test_list_versions_auth_errors() {
    for status in [401, 403] {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", VERSIONS_PATH)
            .match_query(Matcher::Any)
            .with_status(status)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .list_versions("octo", OwnerKind::User, "app")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Auth", "status {}", status);
    }
}

#[tokio::test]
async fn test_list_versions_server_error_is_transient() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Any)
        .with_status(502)
        .create_async()
        .await;

    let err = client(&server)
        .list_versions("octo", OwnerKind::User, "app")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Transient");
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let mut server = mockito::Server::new_async().await;
    let limited = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let records = client(&server)
        .list_versions("octo", OwnerKind::User, "app")
        .await
        .unwrap();
    assert!(records.is_empty());
    limited.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_secondary_rate_limit_403_is_retried() {
    let mut server = mockito::Server::new_async().await;
    let limited = server
        .mock("GET", "/users/octo")
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_header("retry-after", "0")
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/users/octo")
        .with_status(200)
        .with_body(r#"{"type":"User"}"#)
        .expect(1)
        .create_async()
        .await;

    assert_eq!(
        client(&server).classify_owner("octo").await.unwrap(),
        OwnerKind::User
    );
    limited.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn test_rate_limit_exhausted() {
    let mut server = mockito::Server::new_async().await;
    let limited = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "0")
        .expect(4)
        .create_async()
        .await;

    let err = client(&server)
        .list_versions("octo", OwnerKind::User, "app")
        .await
        .unwrap_err();
    limited.assert_async().await;
    match err {
        GhcrError::RateLimited { retry_after, .. } => assert_eq!(retry_after, Some(0)),
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_version_id_by_digest() {
    let mut server = mockito::Server::new_async().await;
    let body = serde_json::json!([
        version_json(11, "sha256:aaa", &["v1"], "2025-01-15T10:00:00Z"),
        version_json(12, "sha256:bbb", &[], "2025-01-10T10:00:00Z"),
    ]);
    let _mock = server
        .mock("GET", VERSIONS_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body.to_string())
        .expect_at_least(1)
        .create_async()
        .await;

    let client = client(&server);
    assert_eq!(
        client
            .get_version_id_by_digest("octo", OwnerKind::User, "app", "sha256:BBB")
            .await
            .unwrap(),
        12
    );
    let err = client
        .get_version_id_by_digest("octo", OwnerKind::User, "app", "sha256:zzz")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DigestNotFound");
}

#[tokio::test]
async fn test_cancelled_operation_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/users/octo")
        .expect(0)
        .create_async()
        .await;

    let operation = Operation::default();
    operation.cancel();
    let client =
        ControlClient::new(reqwest::Client::new(), &server.url(), "t", operation).unwrap();
    let err = client.classify_owner("octo").await.unwrap_err();
    assert_eq!(err.kind(), "Cancelled");
    mock.assert_async().await;
}

/// Serves one response whose headers arrive but whose body never completes
/// until `release` is dropped.
fn stalled_body_server() -> (String, std::sync::mpsc::Sender<()>) {
    use std::io::{Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (release, held) = std::sync::mpsc::channel::<()>();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf);
        let _ = stream.write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 4096\r\n\r\n[",
        );
        let _ = stream.flush();
        let _ = held.recv();
    });
    (url, release)
}

#[tokio::test]
async fn test_cancel_interrupts_body_read() {
    let (url, release) = stalled_body_server();
    let operation = Operation::default();
    let client = ControlClient::new(reqwest::Client::new(), &url, "t", operation.clone()).unwrap();

    let canceller = operation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let err = client
        .list_versions("octo", OwnerKind::User, "app")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Cancelled");
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    drop(release);
}
