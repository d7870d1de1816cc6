use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::FixedOffset;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use harbor_lister::config::ResolvedConfig;
use harbor_lister::error::ListerError;
use harbor_lister::harbor::{HarborClient, HarborHttpClient};

fn config(base_url: String) -> ResolvedConfig {
    ResolvedConfig {
        harbor_url: base_url,
        username: "u".to_string(),
        password: "p".to_string(),
        output: Utf8PathBuf::from("unused.xlsx"),
        insecure_ssl: false,
        concurrency: 1,
        page_size: 10,
        timeout: Duration::from_secs(5),
        utc_offset: FixedOffset::east_opt(0).unwrap(),
    }
}

/// The blocking client owns a runtime of its own, so it is built, used and
/// dropped on a blocking thread.
async fn with_client<T, F>(server: &MockServer, call: F) -> T
where
    T: Send + 'static,
    F: FnOnce(&HarborHttpClient) -> T + Send + 'static,
{
    let base_url = server.uri();
    tokio::task::spawn_blocking(move || {
        let client = HarborHttpClient::new(&config(base_url)).unwrap();
        call(&client)
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/systeminfo"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/systeminfo"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/systeminfo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "harbor_version": "v2.9.0" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let info = with_client(&server, |client| client.system_info()).await.unwrap();
    assert_eq!(info.harbor_version, "v2.9.0");
}

#[tokio::test(flavor = "multi_thread")]
async fn retries_give_up_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/systeminfo"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(4)
        .mount(&server)
        .await;

    let err = with_client(&server, |client| client.system_info())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ListerError::HarborStatus { status: 503, ref message } if message == "maintenance"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_carry_the_response_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "errors": [{ "code": "NOT_FOUND", "message": "no such project" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = with_client(&server, |client| client.list_projects(1, 10))
        .await
        .unwrap_err();
    match err {
        ListerError::HarborStatus { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("NOT_FOUND"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn requests_send_basic_auth_and_json_headers() {
    let server = MockServer::start().await;
    let agent = format!("harbor-lister/{}", env!("CARGO_PKG_VERSION"));
    Mock::given(method("GET"))
        .and(path("/projects"))
        .and(query_param("page", "2"))
        .and(query_param("page_size", "10"))
        .and(header("authorization", "Basic dTpw"))
        .and(header("accept", "application/json"))
        .and(header("user-agent", agent.as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "name": "library", "project_id": 1 }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let projects = with_client(&server, |client| client.list_projects(2, 10))
        .await
        .unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "library");
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_repository_names_are_double_encoded_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/library/repositories/team%252Fapp/artifacts"))
        .and(query_param("with_tag", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "digest": "sha256:1",
                "tags": [{ "name": "v1", "push_time": "2024-01-02T03:04:05.000Z" }]
            },
            { "digest": "sha256:2", "tags": null }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let artifacts = with_client(&server, |client| {
        client.list_artifacts("library", "team/app", 1, 10)
    })
    .await
    .unwrap();
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[0].tags[0].name, "v1");
    assert!(artifacts[1].tags.is_empty());
}
