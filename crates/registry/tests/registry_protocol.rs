use std::sync::Arc;

use forge_engine::testing::ScriptedTransport;
use forge_engine::{ForgeError, HttpAuth, HttpReply, Workstream};
use forge_registry::{RegistryClient, RegistryTarget};
use forge_types::Secret;

const MANIFEST_URL: &str = "https://r.example/v2/acme/web/manifests/1.git";
const TOKEN_REALM: &str = "https://auth.r.example/token";
const SIGNED_MANIFEST: &str = r#"{"schemaVersion":1,"signatures":[{"header":{}}],"fsLayers":[{"blobSum":"sha256:0"}]}"#;
const UNKNOWN_MANIFEST: &str = r#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#;

fn target() -> RegistryTarget {
    RegistryTarget::new("r.example", "acme", "bob", Secret::new("hunter2"))
}

fn client(transport: ScriptedTransport) -> (RegistryClient, Arc<ScriptedTransport>, Workstream) {
    let transport = Arc::new(transport);
    let workstream = Workstream::new(transport.clone());
    (RegistryClient::new(workstream.clone(), target()), transport, workstream)
}

fn challenge() -> HttpReply {
    HttpReply::new(401, r#"{"errors":[{"code":"UNAUTHORIZED"}]}"#).with_header(
        "Www-Authenticate",
        &format!(r#"Bearer realm="{TOKEN_REALM}",service="r.example",scope="repository:acme/web:pull""#),
    )
}

#[tokio::test]
async fn bearer_challenge_is_answered_with_a_token() {
    let (client, transport, _) = client(
        ScriptedTransport::new()
            .on_request(MANIFEST_URL, HttpReply::new(200, SIGNED_MANIFEST))
            .on_request_once(MANIFEST_URL, challenge())
            .on_request(TOKEN_REALM, HttpReply::new(200, r#"{"token":"t0k3n"}"#)),
    );

    let response = client
        .authenticated_get(MANIFEST_URL, &[200], "bob", &Secret::new("hunter2"))
        .await
        .expect("authenticated");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, SIGNED_MANIFEST);

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[1].0,
        "https://auth.r.example/token?service=r.example&scope=repository%3Aacme%2Fweb%3Apull"
    );
    assert_eq!(
        requests[1].1,
        Some(HttpAuth::Basic {
            user: "bob".into(),
            password: "hunter2".into()
        })
    );
    assert_eq!(requests[2].1, Some(HttpAuth::Bearer("t0k3n".into())));
}

#[tokio::test]
async fn retry_does_not_tolerate_a_second_401() {
    let (client, _, _) = client(
        ScriptedTransport::new()
            .on_request(MANIFEST_URL, challenge())
            .on_request(TOKEN_REALM, HttpReply::new(200, r#"{"token":"t0k3n"}"#)),
    );

    let error = client
        .authenticated_get(MANIFEST_URL, &[200], "bob", &Secret::new("hunter2"))
        .await
        .expect_err("second 401 fails");
    let ForgeError::Task(task) = error else { panic!("expected task error") };
    assert_eq!(task.code(), Some(401));
}

#[tokio::test]
async fn missing_image_is_cached_as_absent() {
    let (client, transport, _) = client(ScriptedTransport::new().on_request(MANIFEST_URL, HttpReply::new(404, UNKNOWN_MANIFEST)));

    assert!(!client.image_exists_remote("web", "1.git").await.expect("classified"));
    assert_eq!(client.cache().get("r.example/acme/web:1.git"), Some(false));

    assert!(!client.image_exists_remote("web", "1.git").await.expect("cached"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn invalidation_forces_a_fresh_check() {
    let (client, transport, _) = client(
        ScriptedTransport::new()
            .on_request(MANIFEST_URL, HttpReply::new(200, SIGNED_MANIFEST))
            .on_request_once(MANIFEST_URL, HttpReply::new(404, UNKNOWN_MANIFEST)),
    );

    assert!(!client.image_exists_remote("web", "1.git").await.expect("first check"));
    client.invalidate("r.example/acme/web:1.git");
    assert!(client.image_exists_remote("web", "1.git").await.expect("fresh check"));
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn unclassifiable_manifest_is_fatal_and_uncached() {
    let body = r#"{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json"}"#;
    let (client, _, _) = client(ScriptedTransport::new().on_request(MANIFEST_URL, HttpReply::new(200, body)));

    let error = client.image_exists_remote("web", "1.git").await.expect_err("never guessed");
    match error {
        ForgeError::RegistryProtocol { body: raw, .. } => assert_eq!(raw, body),
        other => panic!("unexpected error: {other}"),
    }
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn direct_answers_stay_hidden() {
    let (client, _, workstream) = client(ScriptedTransport::new().on_request(MANIFEST_URL, HttpReply::new(404, UNKNOWN_MANIFEST)));

    client.image_exists_remote("web", "1.git").await.expect("classified");
    let items = workstream.items();
    assert_eq!(items.len(), 1);
    assert!(!items[0].visible);
    assert_eq!(items[0].start_summary, format!("GET {MANIFEST_URL}"));
}

#[tokio::test]
async fn only_the_bearer_retry_is_visible_and_the_token_is_never_logged() {
    let (client, _, workstream) = client(
        ScriptedTransport::new()
            .on_request(MANIFEST_URL, HttpReply::new(200, SIGNED_MANIFEST))
            .on_request_once(MANIFEST_URL, challenge())
            .on_request(TOKEN_REALM, HttpReply::new(200, r#"{"token":"t0k3n"}"#)),
    );

    assert!(client.image_exists_remote("web", "1.git").await.expect("classified"));

    let items = workstream.items();
    let visibility: Vec<bool> = items.iter().map(|item| item.visible).collect();
    assert_eq!(visibility, vec![false, false, true]);
    assert!(items.iter().all(|item| !item.output.contains("t0k3n")));
}

#[tokio::test]
async fn clients_can_share_a_cache() {
    let (client, transport, workstream) = client(ScriptedTransport::new().on_request(MANIFEST_URL, HttpReply::new(200, SIGNED_MANIFEST)));
    assert!(client.image_exists_remote("web", "1.git").await.expect("checked"));

    let sibling = RegistryClient::new(workstream, target()).with_cache(client.cache().clone());
    assert!(sibling.image_exists_remote("web", "1.git").await.expect("cached"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn scheme_can_be_overridden_for_plain_http_registries() {
    let url = "http://r.example/v2/acme/web/manifests/1.git";
    let (client, transport, _) = client(ScriptedTransport::new().on_request(url, HttpReply::new(404, UNKNOWN_MANIFEST)));
    let client = client.with_scheme("http");

    assert!(!client.image_exists_remote("web", "1.git").await.expect("classified"));
    assert_eq!(transport.requests()[0].0, url);
}
