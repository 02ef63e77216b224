#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use fedagg_cache::{CacheStore, FileCacheStore};
use fedagg_core::{AggregatorRegistry, FetchSettings};
use fedagg_types::AggregatorConfig;
use tempfile::TempDir;

pub const SAML2: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const SAML11: &str = "urn:oasis:names:tc:SAML:1.1:protocol";

/// A local metadata publisher whose response can be changed mid-test.
#[derive(Clone)]
pub struct Upstream {
    pub base: String,
    hits: Arc<AtomicUsize>,
    response: Arc<Mutex<(StatusCode, String)>>,
}

impl Upstream {
    pub fn url(&self) -> String {
        format!("{}/metadata.xml", self.base)
    }

    pub fn slow_url(&self) -> String {
        format!("{}/slow.xml", self.base)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn serve(&self, body: impl Into<String>) {
        *self.response.lock().unwrap() = (StatusCode::OK, body.into());
    }

    pub fn fail(&self, status: StatusCode) {
        *self.response.lock().unwrap() = (status, "unavailable".to_string());
    }
}

async fn metadata(State(upstream): State<Upstream>) -> impl IntoResponse {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    let (status, body) = upstream.response.lock().unwrap().clone();
    (
        status,
        [(header::CONTENT_TYPE, "application/samlmetadata+xml")],
        body,
    )
}

async fn slow(State(upstream): State<Upstream>) -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    metadata(State(upstream)).await
}

pub async fn upstream(body: impl Into<String>) -> Upstream {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upstream = Upstream {
        base: format!("http://{addr}"),
        hits: Arc::new(AtomicUsize::new(0)),
        response: Arc::new(Mutex::new((StatusCode::OK, body.into()))),
    };
    let app = Router::new()
        .route("/metadata.xml", get(metadata))
        .route("/slow.xml", get(slow))
        .with_state(upstream.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    upstream
}

pub fn entity(entity_id: &str, role: &str, protocol: &str) -> String {
    format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{entity_id}"><md:{role} protocolSupportEnumeration="{protocol}"/></md:EntityDescriptor>"#
    )
}

pub fn idp(entity_id: &str) -> String {
    entity(entity_id, "IDPSSODescriptor", SAML2)
}

pub fn sp(entity_id: &str) -> String {
    entity(entity_id, "SPSSODescriptor", SAML2)
}

pub fn container(children: &[String]) -> String {
    format!(
        r#"<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata">{}</md:EntitiesDescriptor>"#,
        children.concat()
    )
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// A cache directory plus a registry over `aggregators` backed by it.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<FileCacheStore>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileCacheStore::new(dir.path().join("cache")));
        Self { dir, store }
    }

    pub fn registry(&self, aggregators: Vec<(&str, AggregatorConfig)>) -> AggregatorRegistry {
        let map: BTreeMap<String, AggregatorConfig> = aggregators
            .into_iter()
            .map(|(id, config)| (id.to_string(), config))
            .collect();
        let store: Arc<dyn CacheStore> = self.store.clone();
        AggregatorRegistry::new(map, store)
            .with_cert_dir(fixture(""))
            .with_fetch_settings(FetchSettings {
                timeout: Duration::from_millis(500),
                user_agent: "fedagg-test".to_string(),
            })
    }
}

pub fn entity_ids(xml: &str) -> Vec<String> {
    fedagg_metadata::MetadataNode::parse(xml)
        .unwrap()
        .entities()
        .iter()
        .map(|e| e.entity_id.clone())
        .collect()
}
