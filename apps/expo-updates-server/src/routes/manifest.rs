use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use expo_updates_core::{ProtocolRequest, ProtocolResponse, RawProtocolRequest, Result};
use serde::Deserialize;

use super::ApiError;
use crate::metrics;
use crate::state::AppState;

const ENDPOINT: &str = "manifest";

/// Query fallbacks for clients that cannot set the `expo-*` headers.
#[derive(Debug, Default, Deserialize)]
pub struct ManifestQuery {
    platform: Option<String>,
    #[serde(rename = "runtime-version")]
    runtime_version: Option<String>,
}

pub async fn manifest(
    State(state): State<AppState>,
    Query(query): Query<ManifestQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let raw = RawProtocolRequest {
        protocol_version: header(&headers, "expo-protocol-version"),
        platform: header(&headers, "expo-platform").or(query.platform.as_deref()),
        runtime_version: header(&headers, "expo-runtime-version")
            .or(query.runtime_version.as_deref()),
        current_update_id: header(&headers, "expo-current-update-id"),
        embedded_update_id: header(&headers, "expo-embedded-update-id"),
        expect_signature: headers.contains_key("expo-expect-signature"),
    };

    let response = answer(&state, raw)
        .await
        .map_err(|err| ApiError::record(ENDPOINT, err))?;
    metrics::record_response(response.kind);
    into_http(response)
}

async fn answer(state: &AppState, raw: RawProtocolRequest<'_>) -> Result<ProtocolResponse> {
    let request = ProtocolRequest::parse(raw)?;
    state.protocol().respond(&request).await
}

fn into_http(response: ProtocolResponse) -> Result<Response, ApiError> {
    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in response.headers() {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(response.body))
        .map_err(|err| ApiError::Internal(err.to_string()))
}

/// Empty header values count as absent.
fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}
