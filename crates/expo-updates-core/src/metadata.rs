use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, StoreError, UpdatesError};
use crate::protocol::Platform;
use crate::resolver::BundleRef;
use crate::store::BundleStore;

pub const METADATA_FILE: &str = "metadata.json";
pub const EXPO_CONFIG_FILE: &str = "expoConfig.json";

/// `metadata.json` as written by `expo export`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub bundler: Option<String>,
    pub file_metadata: FileMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub ios: Option<PlatformMetadata>,
    #[serde(default)]
    pub android: Option<PlatformMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformMetadata {
    /// Launch asset path, relative to the bundle directory.
    pub bundle: String,
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetEntry {
    pub path: String,
    pub ext: String,
}

impl BundleMetadata {
    pub fn platform(&self, platform: Platform) -> Result<&PlatformMetadata> {
        let entry = match platform {
            Platform::Ios => self.file_metadata.ios.as_ref(),
            Platform::Android => self.file_metadata.android.as_ref(),
        };
        entry.ok_or_else(|| UpdatesError::not_found(format!("No update for platform {platform}")))
    }
}

/// Parsed `metadata.json` plus the identity derived from its bytes.
#[derive(Debug, Clone)]
pub struct LoadedMetadata {
    pub document: BundleMetadata,
    pub created_at: String,
    /// Hex sha256 of the raw metadata bytes.
    pub id: String,
    /// `id` reshaped into the UUID form clients report back.
    pub update_id: String,
}

pub async fn load_metadata(store: &dyn BundleStore, bundle: &BundleRef) -> Result<LoadedMetadata> {
    let path = bundle.path.join(METADATA_FILE);
    let bytes = read_required(store, &path, || {
        format!(
            "No update found with runtime version: {}",
            bundle.runtime_version
        )
    })
    .await?;

    let document: BundleMetadata = parse_document(&path, &bytes)?;
    let created_at = iso8601(store.created_at(&path).await?);
    let digest: [u8; 32] = Sha256::digest(&bytes).into();

    Ok(LoadedMetadata {
        document,
        created_at,
        id: hex::encode(digest),
        update_id: update_id_from_digest(&digest),
    })
}

/// Loads `expoConfig.json`, which is passed through to clients untouched.
pub async fn load_config(store: &dyn BundleStore, bundle: &BundleRef) -> Result<Map<String, Value>> {
    let path = bundle.path.join(EXPO_CONFIG_FILE);
    let bytes = read_required(store, &path, || {
        format!(
            "No expo config json found with runtime version: {}",
            bundle.runtime_version
        )
    })
    .await?;
    parse_document(&path, &bytes)
}

/// Formats the first 128 bits of a sha256 digest as a hyphenated UUID, which
/// is the first 32 hex characters grouped 8-4-4-4-12.
pub fn update_id_from_digest(digest: &[u8; 32]) -> String {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(raw).hyphenated().to_string()
}

pub fn iso8601(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn read_required(
    store: &dyn BundleStore,
    path: &Path,
    missing: impl FnOnce() -> String,
) -> Result<Vec<u8>> {
    match store.read_file(path).await {
        Ok(bytes) => Ok(bytes),
        Err(StoreError::NotFound(_)) => Err(UpdatesError::not_found(missing())),
        Err(err) => Err(err.into()),
    }
}

fn parse_document<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| UpdatesError::MalformedDocument {
        path: PathBuf::from(path),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBundleStore;
    use std::time::{Duration, UNIX_EPOCH};

    const METADATA: &str = r#"{
        "version": 0,
        "bundler": "metro",
        "fileMetadata": {
            "ios": {
                "bundle": "bundles/ios-abc.js",
                "assets": [{ "path": "assets/1f2e", "ext": "png" }]
            }
        }
    }"#;

    fn bundle() -> BundleRef {
        BundleRef {
            runtime_version: "1.0.0".into(),
            name: "1700000500".into(),
            path: PathBuf::from("/updates/1.0.0/1700000500"),
        }
    }

    #[test]
    fn update_id_slices_first_32_hex_chars() {
        let mut digest = [0u8; 32];
        hex::decode_to_slice(
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            &mut digest,
        )
        .unwrap();
        assert_eq!(
            update_id_from_digest(&digest),
            "01234567-89ab-cdef-0123-456789abcdef"
        );
    }

    #[test]
    fn iso8601_is_utc_with_z() {
        let time = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(iso8601(time), "2023-11-14T22:13:20.123Z");
    }

    #[tokio::test]
    async fn loads_metadata_and_identity() {
        let store = InMemoryBundleStore::new("/updates");
        let created = UNIX_EPOCH + Duration::from_secs(1_700_000_500);
        store
            .insert_file_at(bundle().path.join(METADATA_FILE), METADATA, created)
            .await;

        let loaded = load_metadata(store.as_ref(), &bundle()).await.unwrap();
        assert_eq!(loaded.created_at, "2023-11-14T22:21:40.000Z");
        assert_eq!(loaded.id, hex::encode(Sha256::digest(METADATA.as_bytes())));
        assert_eq!(loaded.update_id, {
            let id = &loaded.id;
            format!("{}-{}-{}-{}-{}", &id[0..8], &id[8..12], &id[12..16], &id[16..20], &id[20..32])
        });

        let ios = loaded.document.platform(Platform::Ios).unwrap();
        assert_eq!(ios.bundle, "bundles/ios-abc.js");
        assert_eq!(ios.assets[0].ext, "png");
        assert!(matches!(
            loaded.document.platform(Platform::Android),
            Err(UpdatesError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_and_malformed_documents() {
        let store = InMemoryBundleStore::new("/updates");
        let err = load_metadata(store.as_ref(), &bundle()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "No update found with runtime version: 1.0.0"
        );

        store
            .insert_file(bundle().path.join(METADATA_FILE), r#"{"fileMetadata": 3}"#)
            .await;
        let err = load_metadata(store.as_ref(), &bundle()).await.unwrap_err();
        assert!(matches!(err, UpdatesError::MalformedDocument { .. }));

        store
            .insert_file(bundle().path.join(EXPO_CONFIG_FILE), "[1, 2]")
            .await;
        let err = load_config(store.as_ref(), &bundle()).await.unwrap_err();
        assert!(matches!(err, UpdatesError::MalformedDocument { .. }));

        store
            .insert_file(bundle().path.join(EXPO_CONFIG_FILE), r#"{"name": "demo"}"#)
            .await;
        let config = load_config(store.as_ref(), &bundle()).await.unwrap();
        assert_eq!(config["name"], "demo");
    }
}
