use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use fedagg_cache::{CacheStore, FileCacheStore};
use fedagg_core::AggregatorRegistry;
use fedagg_metadata::MetadataNode;
use fedagg_server::{api::AggregatorSummary, app, AppState};
use fedagg_types::{AggregatorConfig, SigningConfig, SourceConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

const FEED: &str = r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata"><md:EntityDescriptor entityID="https://idp.example.org/"><md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/></md:EntityDescriptor><md:EntityDescriptor entityID="https://sp.example.org/"><md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/></md:EntityDescriptor></md:EntitiesDescriptor>"#;

async fn serve_feed() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upstream = Router::new().route("/feed.xml", get(|| async { FEED }));
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });
    format!("http://{addr}/feed.xml")
}

async fn setup() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = serve_feed().await;

    let mut aggregators = BTreeMap::new();
    aggregators.insert(
        "curated".to_string(),
        AggregatorConfig {
            sources: vec![SourceConfig::new(url.clone())],
            exclude: vec!["https://sp.example.org/".into()],
            ..AggregatorConfig::default()
        },
    );
    aggregators.insert(
        "local".to_string(),
        AggregatorConfig {
            name: Some("Local federation".into()),
            sources: vec![SourceConfig::new(url)],
            ..AggregatorConfig::default()
        },
    );
    aggregators.insert(
        "misconfigured".to_string(),
        AggregatorConfig {
            sign: Some(SigningConfig {
                private_key: "signing.key".into(),
                private_key_pass: None,
                certificate: None,
                algorithm: Some("hmac-md5".into()),
            }),
            ..AggregatorConfig::default()
        },
    );

    let store: Arc<dyn CacheStore> = Arc::new(FileCacheStore::new(dir.path().join("cache")));
    let registry = AggregatorRegistry::new(aggregators, store).with_cert_dir(dir.path());
    let state = AppState {
        registry: Arc::new(registry),
    };
    (app(state), dir)
}

async fn get_response(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

fn entity_ids(xml: &str) -> Vec<String> {
    MetadataNode::parse(xml)
        .unwrap()
        .entities()
        .iter()
        .map(|e| e.entity_id.clone())
        .collect()
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (app, _dir) = setup().await;
    let (status, _, body) = get_response(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn serves_aggregate_with_default_content_type() {
    let (app, _dir) = setup().await;
    let (status, content_type, body) = get_response(app, "/get?id=local").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/samlmetadata+xml"));
    assert_eq!(
        entity_ids(&body),
        ["https://idp.example.org/", "https://sp.example.org/"]
    );
}

#[tokio::test]
async fn applies_filter_and_exclusion_parameters() {
    let (app, _dir) = setup().await;
    let (_, _, body) = get_response(app.clone(), "/get?id=local&set=saml20-sp").await;
    assert_eq!(entity_ids(&body), ["https://sp.example.org/"]);

    let (_, _, body) = get_response(
        app,
        "/get?id=local&exclude=https%3A%2F%2Fsp.example.org%2F,urn:unknown",
    )
    .await;
    assert_eq!(entity_ids(&body), ["https://idp.example.org/"]);
}

#[tokio::test]
async fn empty_exclude_parameter_clears_configured_exclusions() {
    let (app, _dir) = setup().await;
    let (_, _, body) = get_response(app.clone(), "/get?id=curated").await;
    assert_eq!(entity_ids(&body), ["https://idp.example.org/"]);

    let (status, _, body) = get_response(app, "/get?id=curated&exclude=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        entity_ids(&body),
        ["https://idp.example.org/", "https://sp.example.org/"]
    );
}

#[tokio::test]
async fn plain_text_is_pretty_printed() {
    let (app, _dir) = setup().await;
    let (status, content_type, body) =
        get_response(app, "/get?id=local&mimetype=text/plain").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert!(body.contains("\n  <md:EntityDescriptor"));
    assert_eq!(entity_ids(&body).len(), 2);
}

#[tokio::test]
async fn unknown_mimetype_falls_back_to_default() {
    let (app, _dir) = setup().await;
    let (_, content_type, _) = get_response(app.clone(), "/get?id=local&mimetype=text/html").await;
    assert_eq!(content_type.as_deref(), Some("application/samlmetadata+xml"));

    let (_, content_type, _) =
        get_response(app, "/get?id=local&mimetype=application/xml").await;
    assert_eq!(content_type.as_deref(), Some("application/xml"));
}

#[tokio::test]
async fn missing_id_is_a_bad_request() {
    let (app, _dir) = setup().await;
    for uri in ["/get", "/get?id=", "/get?id=%20"] {
        let (status, _, body) = get_response(app.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        let json: Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("id"));
    }
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let (app, _dir) = setup().await;
    let (status, _, body) = get_response(app, "/get?id=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn configuration_error_is_a_server_error() {
    let (app, _dir) = setup().await;
    let (status, _, body) = get_response(app, "/get?id=misconfigured").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn lists_configured_aggregators() {
    let (app, _dir) = setup().await;
    let (status, _, body) = get_response(app, "/aggregators").await;
    assert_eq!(status, StatusCode::OK);
    let list: Vec<AggregatorSummary> = serde_json::from_str(&body).unwrap();
    let ids: Vec<_> = list.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["curated", "local", "misconfigured"]);
    assert_eq!(list[1].name.as_deref(), Some("Local federation"));
    assert!(list[2].name.is_none());
}
