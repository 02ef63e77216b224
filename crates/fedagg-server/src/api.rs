//! Metadata endpoints.

use crate::AppState;
use axum::{
    extract::{Extension, Json, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use fedagg_core::AggregatorError;
use fedagg_metadata::{parse_document, to_pretty_xml_string};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Content type served when none or an unknown one is requested.
pub const DEFAULT_MIMETYPE: &str = "application/samlmetadata+xml";

/// Representations a client may ask for through `mimetype`.
const ALTERNATE_MIMETYPES: [&str; 3] = [
    "text/plain",
    "application/samlmetadata-xml",
    "application/xml",
];

/// Query string of `GET /get`.
#[derive(Debug, Default, Deserialize)]
pub struct GetMetadataQuery {
    /// Aggregator id.
    pub id: Option<String>,
    /// Comma-separated filter tokens, e.g. `saml20-idp,saml20-sp`.
    pub set: Option<String>,
    /// Comma-separated entity IDs to drop.
    pub exclude: Option<String>,
    pub mimetype: Option<String>,
}

/// One entry of `GET /aggregators`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AggregatorSummary {
    pub id: String,
    pub name: Option<String>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<AggregatorError> for ApiError {
    fn from(e: AggregatorError) -> Self {
        match e {
            AggregatorError::NotFound(id) => ApiError::NotFound(format!("no aggregator '{id}'")),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Picks the response content type; anything unrecognized gets the default.
pub fn negotiate_mimetype(requested: Option<&str>) -> &'static str {
    requested
        .map(str::trim)
        .and_then(|r| ALTERNATE_MIMETYPES.into_iter().find(|m| m.eq_ignore_ascii_case(r)))
        .unwrap_or(DEFAULT_MIMETYPE)
}

fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Handler for `GET /get?id=<id>[&set=..][&exclude=..][&mimetype=..]`.
pub async fn get_metadata_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<GetMetadataQuery>,
) -> Result<Response, ApiError> {
    let id = query
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing required parameter 'id'".to_string()))?;

    let mut aggregator = state.registry.get_aggregator(id)?;
    if let Some(set) = &query.set {
        aggregator.set_filters(split_list(set));
    }
    if let Some(exclude) = &query.exclude {
        aggregator.exclude_entities(split_list(exclude));
    }
    let xml = aggregator.get_metadata().await?;

    let mimetype = negotiate_mimetype(query.mimetype.as_deref());
    // The pretty form is for reading only; re-indenting breaks any signature.
    let body = if mimetype == "text/plain" {
        let root = parse_document(&xml)
            .map_err(|e| ApiError::InternalServerError(format!("generated aggregate: {e}")))?;
        to_pretty_xml_string(&root)
    } else {
        xml
    };

    Ok(([(header::CONTENT_TYPE, mimetype)], body).into_response())
}

/// Handler for `GET /aggregators`.
pub async fn list_aggregators_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<Vec<AggregatorSummary>> {
    let summaries = state
        .registry
        .ids()
        .map(|id| AggregatorSummary {
            id: id.to_string(),
            name: state.registry.config(id).and_then(|c| c.name.clone()),
        })
        .collect();
    Json(summaries)
}
