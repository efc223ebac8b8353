use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::asset::{AssetContext, AssetDescriptor, AssetKind};
use crate::directive::{build_no_update, build_rollback, has_rollback_marker, Directive};
use crate::error::{Result, UpdatesError};
use crate::metadata::{load_config, load_metadata};
use crate::multipart::{self, Part};
use crate::resolver::{resolve_latest, BundleRef};
use crate::signing::{load_private_key, sign, signature_header};
use crate::store::BundleStore;

pub const HEADER_PROTOCOL_VERSION: &str = "expo-protocol-version";
pub const HEADER_SFV_VERSION: &str = "expo-sfv-version";
pub const HEADER_SIGNATURE: &str = "expo-signature";
pub const CACHE_CONTROL: &str = "private, max-age=0";

const JSON_UTF8: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ios" => Some(Platform::Ios),
            "android" => Some(Platform::Android),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request fields as they arrive, headers already merged with query fallbacks.
#[derive(Debug, Clone, Default)]
pub struct RawProtocolRequest<'a> {
    pub protocol_version: Option<&'a str>,
    pub platform: Option<&'a str>,
    pub runtime_version: Option<&'a str>,
    pub current_update_id: Option<&'a str>,
    pub embedded_update_id: Option<&'a str>,
    pub expect_signature: bool,
}

/// A validated manifest request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRequest {
    pub protocol_version: u32,
    pub platform: Platform,
    pub runtime_version: String,
    pub current_update_id: Option<String>,
    pub embedded_update_id: Option<String>,
    pub expect_signature: bool,
}

impl ProtocolRequest {
    pub fn parse(raw: RawProtocolRequest<'_>) -> Result<Self> {
        let protocol_version = match raw.protocol_version.map(str::trim) {
            None | Some("") => 0,
            Some(value) => value.parse::<u32>().map_err(|_| {
                UpdatesError::invalid_request(format!(
                    "Invalid expo-protocol-version header: {value}"
                ))
            })?,
        };
        let platform = raw.platform.and_then(Platform::parse).ok_or_else(|| {
            UpdatesError::invalid_request("Unsupported platform. Expected either ios or android.")
        })?;
        let runtime_version = raw
            .runtime_version
            .filter(|value| !value.is_empty())
            .ok_or_else(|| UpdatesError::invalid_request("No runtimeVersion provided."))?;

        Ok(Self {
            protocol_version,
            platform,
            runtime_version: runtime_version.to_string(),
            current_update_id: raw.current_update_id.map(str::to_string),
            embedded_update_id: raw.embedded_update_id.map(str::to_string),
            expect_signature: raw.expect_signature,
        })
    }

    fn supports_directives(&self) -> bool {
        self.protocol_version >= 1
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub created_at: String,
    pub runtime_version: String,
    pub assets: Vec<AssetDescriptor>,
    pub launch_asset: AssetDescriptor,
    pub metadata: Map<String, Value>,
    pub extra: ManifestExtra,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestExtra {
    pub expo_client: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extensions {
    pub asset_request_headers: BTreeMap<String, BTreeMap<String, String>>,
}

/// Outcome of the update-type state machine, before signing and framing.
#[derive(Debug, Clone)]
pub enum Decision {
    Update(Box<Manifest>),
    Rollback(Directive),
    NoUpdate,
}

impl Decision {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Decision::Update(_) => ResponseKind::Manifest,
            Decision::Rollback(_) => ResponseKind::Rollback,
            Decision::NoUpdate => ResponseKind::NoUpdate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Manifest,
    Rollback,
    NoUpdate,
}

/// A fully framed multipart response.
#[derive(Debug, Clone)]
pub struct ProtocolResponse {
    pub kind: ResponseKind,
    pub protocol_version: u32,
    pub content_type: String,
    pub signature: Option<String>,
    pub body: Bytes,
}

impl ProtocolResponse {
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (HEADER_PROTOCOL_VERSION, self.protocol_version.to_string()),
            (HEADER_SFV_VERSION, "0".to_string()),
            ("cache-control", CACHE_CONTROL.to_string()),
            ("content-type", self.content_type.clone()),
        ];
        if let Some(signature) = &self.signature {
            headers.push((HEADER_SIGNATURE, signature.clone()));
        }
        headers
    }
}

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Public URL of the asset endpoint that manifest asset URLs point at.
    pub assets_endpoint: Url,
    pub private_key_path: Option<PathBuf>,
    /// Headers clients attach when fetching each asset.
    pub asset_request_headers: BTreeMap<String, String>,
}

/// Answers manifest requests against a bundle store.
#[derive(Clone)]
pub struct UpdateProtocol {
    store: Arc<dyn BundleStore>,
    config: Arc<ProtocolConfig>,
}

impl UpdateProtocol {
    pub fn new(store: Arc<dyn BundleStore>, config: ProtocolConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &dyn BundleStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub async fn respond(&self, request: &ProtocolRequest) -> Result<ProtocolResponse> {
        let decision = self.decide(request).await?;
        info!(
            runtime_version = %request.runtime_version,
            platform = %request.platform,
            protocol_version = request.protocol_version,
            kind = ?decision.kind(),
            "answering manifest request"
        );
        self.render(request, decision).await
    }

    /// Runs the update-type state machine for one request.
    pub async fn decide(&self, request: &ProtocolRequest) -> Result<Decision> {
        let store = self.store();
        let bundle = resolve_latest(store, &request.runtime_version).await?;

        if has_rollback_marker(store, &bundle).await {
            return self.decide_rollback(request, &bundle).await;
        }

        let metadata = load_metadata(store, &bundle).await?;
        if request.protocol_version == 1
            && request.current_update_id.as_deref() == Some(metadata.update_id.as_str())
        {
            debug!(update_id = %metadata.update_id, "client already runs the latest update");
            return Ok(Decision::NoUpdate);
        }

        let platform_metadata = metadata.document.platform(request.platform)?;
        let expo_client = load_config(store, &bundle).await?;
        let assets = AssetContext {
            store,
            bundle: &bundle,
            platform: request.platform,
            endpoint: &self.config.assets_endpoint,
        };

        let mut described = Vec::with_capacity(platform_metadata.assets.len());
        for entry in &platform_metadata.assets {
            described.push(
                assets
                    .describe(&entry.path, AssetKind::Declared { ext: &entry.ext })
                    .await?,
            );
        }
        let launch_asset = assets
            .describe(&platform_metadata.bundle, AssetKind::Launch)
            .await?;

        Ok(Decision::Update(Box::new(Manifest {
            id: metadata.update_id,
            created_at: metadata.created_at,
            runtime_version: request.runtime_version.clone(),
            assets: described,
            launch_asset,
            metadata: Map::new(),
            extra: ManifestExtra { expo_client },
        })))
    }

    async fn decide_rollback(
        &self,
        request: &ProtocolRequest,
        bundle: &BundleRef,
    ) -> Result<Decision> {
        if !request.supports_directives() {
            return Err(UpdatesError::invalid_request(
                "Rollbacks not supported on protocol version 0",
            ));
        }
        let embedded = request.embedded_update_id.as_deref().ok_or_else(|| {
            UpdatesError::invalid_request("Invalid Expo-Embedded-Update-ID request header specified.")
        })?;
        if request.current_update_id.as_deref() == Some(embedded) {
            debug!(embedded, "client already runs the embedded update");
            return Ok(Decision::NoUpdate);
        }
        Ok(Decision::Rollback(build_rollback(self.store(), bundle).await?))
    }

    /// Signs and frames a decision.
    pub async fn render(
        &self,
        request: &ProtocolRequest,
        decision: Decision,
    ) -> Result<ProtocolResponse> {
        let kind = decision.kind();
        let (parts, protocol_version, signature) = match decision {
            Decision::Update(manifest) => {
                let body = to_json(&manifest)?;
                let signature = self.signature_for(&body, request.expect_signature).await?;
                let extensions = to_json(&self.extensions_for(&manifest))?;
                let parts = vec![
                    payload_part("manifest", body, signature.as_deref()),
                    Part::new("extensions", extensions).header("content-type", "application/json"),
                ];
                (parts, request.protocol_version, signature)
            }
            Decision::Rollback(directive) => {
                let body = to_json(&directive)?;
                let signature = self.signature_for(&body, request.expect_signature).await?;
                (
                    vec![payload_part("directive", body, signature.as_deref())],
                    1,
                    signature,
                )
            }
            Decision::NoUpdate => {
                let body = to_json(&build_no_update())?;
                let signature = self.signature_for(&body, request.expect_signature).await?;
                (
                    vec![payload_part("directive", body, signature.as_deref())],
                    1,
                    signature,
                )
            }
        };

        let (body, boundary) = multipart::encode(&parts);
        Ok(ProtocolResponse {
            kind,
            protocol_version,
            content_type: multipart::content_type(boundary),
            signature,
            body,
        })
    }

    fn extensions_for(&self, manifest: &Manifest) -> Extensions {
        let asset_request_headers = manifest
            .assets
            .iter()
            .chain(std::iter::once(&manifest.launch_asset))
            .map(|asset| (asset.key.clone(), self.config.asset_request_headers.clone()))
            .collect();
        Extensions {
            asset_request_headers,
        }
    }

    async fn signature_for(&self, payload: &str, expected: bool) -> Result<Option<String>> {
        if !expected {
            return Ok(None);
        }
        let pem = load_private_key(self.config.private_key_path.as_deref())
            .await?
            .ok_or_else(|| {
                UpdatesError::invalid_request(
                    "Code signing requested but no key supplied when starting server.",
                )
            })?;
        Ok(Some(signature_header(&sign(payload, &pem)?)))
    }
}

fn payload_part(name: &str, body: String, signature: Option<&str>) -> Part {
    let part = Part::new(name, body).header("content-type", JSON_UTF8);
    match signature {
        Some(signature) => part.header(HEADER_SIGNATURE, signature),
        None => part,
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(UpdatesError::Encode)
}
