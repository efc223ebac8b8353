use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use expo_updates_core::resolve_asset;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::ApiError;
use crate::metrics;
use crate::state::AppState;

const ENDPOINT: &str = "assets";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetQuery {
    asset: Option<String>,
    runtime_version: Option<String>,
    platform: Option<String>,
}

/// Streams one file of the newest bundle for a runtime version.
pub async fn asset(
    State(state): State<AppState>,
    Query(query): Query<AssetQuery>,
) -> Result<Response, ApiError> {
    let store = state.store();
    let resolved = resolve_asset(
        store,
        query.asset.as_deref(),
        query.runtime_version.as_deref(),
        query.platform.as_deref(),
    )
    .await
    .map_err(|err| ApiError::record(ENDPOINT, err))?;

    let reader = store
        .open_file(&resolved.path)
        .await
        .map_err(|err| ApiError::record(ENDPOINT, err.into()))?;

    debug!(
        path = %resolved.path.display(),
        content_type = %resolved.content_type,
        "serving asset"
    );
    metrics::ASSETS_SERVED.inc();

    let body = Body::from_stream(ReaderStream::new(reader));
    Ok(([(header::CONTENT_TYPE, resolved.content_type)], body).into_response())
}
