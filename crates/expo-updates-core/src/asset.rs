use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use md5::Md5;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Result, UpdatesError};
use crate::metadata::{load_metadata, PlatformMetadata};
use crate::protocol::Platform;
use crate::resolver::{is_timestamp, resolve_latest, BundleRef};
use crate::store::BundleStore;

pub const LAUNCH_ASSET_CONTENT_TYPE: &str = "application/javascript";
pub const LAUNCH_ASSET_EXTENSION: &str = ".bundle";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content-addressed description of one asset, as it appears in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    /// base64url sha256 of the bytes, unpadded.
    pub hash: String,
    /// md5 hex of the bytes; identical content yields identical keys.
    pub key: String,
    pub file_extension: String,
    pub content_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy)]
pub enum AssetKind<'a> {
    Launch,
    Declared { ext: &'a str },
}

/// Everything needed to describe the assets of one bundle for one platform.
pub struct AssetContext<'a> {
    pub store: &'a dyn BundleStore,
    pub bundle: &'a BundleRef,
    pub platform: Platform,
    /// Public URL of the asset endpoint, without query.
    pub endpoint: &'a Url,
}

impl AssetContext<'_> {
    pub async fn describe(&self, file_path: &str, kind: AssetKind<'_>) -> Result<AssetDescriptor> {
        let path = self.bundle.path.join(file_path);
        let bytes = self.store.read_file(&path).await?;

        let (file_extension, content_type) = match kind {
            AssetKind::Launch => (
                LAUNCH_ASSET_EXTENSION.to_string(),
                LAUNCH_ASSET_CONTENT_TYPE.to_string(),
            ),
            AssetKind::Declared { ext } => (format!(".{ext}"), content_type_for_ext(ext)),
        };

        Ok(AssetDescriptor {
            hash: content_hash(&bytes),
            key: content_key(&bytes),
            file_extension,
            content_type,
            url: self.asset_url(&path),
        })
    }

    fn asset_url(&self, path: &Path) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("asset", &path.to_string_lossy())
            .append_pair("runtimeVersion", &self.bundle.runtime_version)
            .append_pair("platform", self.platform.as_str());
        url.into()
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
}

pub fn content_key(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

pub fn content_type_for_ext(ext: &str) -> String {
    mime_guess::from_ext(ext)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

/// A file the asset endpoint is allowed to serve.
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub content_type: String,
}

/// Validates an asset request and works out which file to serve and with
/// which content type.
pub async fn resolve_asset(
    store: &dyn BundleStore,
    asset: Option<&str>,
    runtime_version: Option<&str>,
    platform: Option<&str>,
) -> Result<ResolvedAsset> {
    let asset = asset
        .filter(|value| !value.is_empty())
        .ok_or_else(|| UpdatesError::invalid_request("No asset name provided."))?;
    let platform = platform.and_then(Platform::parse).ok_or_else(|| {
        UpdatesError::invalid_request(r#"No platform provided. Expected "ios" or "android"."#)
    })?;
    let runtime_version = runtime_version
        .filter(|value| !value.is_empty())
        .ok_or_else(|| UpdatesError::invalid_request("No runtimeVersion provided."))?;

    let latest = resolve_latest(store, runtime_version).await?;
    let missing = || UpdatesError::not_found(format!(r#"Asset "{asset}" does not exist."#));
    let requested = Path::new(asset);
    let runtime_dir = latest.path.parent().ok_or_else(missing)?;
    let (owner, relative) = requested
        .strip_prefix(runtime_dir)
        .ok()
        .and_then(split_bundle_relative)
        .ok_or_else(missing)?;

    if !store.exists(requested).await {
        return Err(missing());
    }

    // Clients may still be downloading a bundle that is no longer the newest,
    // so the file's own bundle decides its content type.
    let content_type = if owner == latest.name {
        let metadata = load_metadata(store, &latest).await?;
        served_content_type(Some(metadata.document.platform(platform)?), relative)
    } else {
        let bundle = BundleRef {
            runtime_version: runtime_version.to_string(),
            name: owner.to_string(),
            path: runtime_dir.join(owner),
        };
        let metadata = load_metadata(store, &bundle).await.ok();
        let platform_metadata = metadata
            .as_ref()
            .and_then(|metadata| metadata.document.platform(platform).ok());
        served_content_type(platform_metadata, relative)
    };

    Ok(ResolvedAsset {
        path: requested.to_path_buf(),
        content_type,
    })
}

/// Splits a runtime-relative path into its bundle directory name and the
/// path inside that bundle. Anything but plain components is rejected.
fn split_bundle_relative(relative: &Path) -> Option<(&str, &Path)> {
    let mut components = relative.components();
    let owner = match components.next()? {
        Component::Normal(name) => name.to_str()?,
        _ => return None,
    };
    let inner = components.as_path();
    (is_timestamp(owner) && is_contained(inner)).then_some((owner, inner))
}

fn served_content_type(platform: Option<&PlatformMetadata>, relative: &Path) -> String {
    let name = relative.to_string_lossy();
    if let Some(platform) = platform {
        if platform.bundle == name {
            return LAUNCH_ASSET_CONTENT_TYPE.to_string();
        }
        if let Some(entry) = platform.assets.iter().find(|entry| entry.path == name) {
            return content_type_for_ext(&entry.ext);
        }
    }
    mime_guess::from_path(relative)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

fn is_contained(relative: &Path) -> bool {
    !relative.as_os_str().is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::metadata::METADATA_FILE;
    use crate::store::InMemoryBundleStore;

    const METADATA: &str = r#"{
        "fileMetadata": {
            "android": {
                "bundle": "bundles/android-abc.hbc",
                "assets": [
                    { "path": "assets/4f1c", "ext": "png" },
                    { "path": "assets/99aa", "ext": "ttf" }
                ]
            }
        }
    }"#;

    fn endpoint() -> Url {
        Url::parse("https://updates.example.com/api/assets").unwrap()
    }

    async fn fixture() -> (std::sync::Arc<InMemoryBundleStore>, BundleRef) {
        let store = InMemoryBundleStore::new("/srv/updates");
        let bundle = BundleRef {
            runtime_version: "1.0.0".into(),
            name: "1700000500".into(),
            path: store.bundle_path("1.0.0", "1700000500"),
        };
        store
            .insert_file(bundle.path.join(METADATA_FILE), METADATA)
            .await;
        store
            .insert_file(bundle.path.join("bundles/android-abc.hbc"), "launch")
            .await;
        store
            .insert_file(bundle.path.join("assets/4f1c"), b"same-bytes".to_vec())
            .await;
        store
            .insert_file(bundle.path.join("assets/99aa"), b"same-bytes".to_vec())
            .await;
        (store, bundle)
    }

    #[test]
    fn hash_is_unpadded_base64url_sha256() {
        // sha256("hello") = 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
        assert_eq!(
            content_hash(b"hello"),
            "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ"
        );
        assert_eq!(content_key(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn unknown_extensions_fall_back_to_octet_stream() {
        assert_eq!(content_type_for_ext("png"), "image/png");
        assert_eq!(
            content_type_for_ext("definitely-not-an-ext"),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn describes_declared_and_launch_assets() {
        let (store, bundle) = fixture().await;
        let endpoint = endpoint();
        let ctx = AssetContext {
            store: store.as_ref(),
            bundle: &bundle,
            platform: Platform::Android,
            endpoint: &endpoint,
        };

        let png = ctx
            .describe("assets/4f1c", AssetKind::Declared { ext: "png" })
            .await
            .unwrap();
        assert_eq!(png.file_extension, ".png");
        assert_eq!(png.content_type, "image/png");
        assert_eq!(
            png.url,
            "https://updates.example.com/api/assets?asset=%2Fsrv%2Fupdates%2F1.0.0%2F1700000500%2Fassets%2F4f1c&runtimeVersion=1.0.0&platform=android"
        );

        let font = ctx
            .describe("assets/99aa", AssetKind::Declared { ext: "ttf" })
            .await
            .unwrap();
        assert_eq!(font.key, png.key);
        assert_eq!(font.hash, png.hash);

        let launch = ctx
            .describe("bundles/android-abc.hbc", AssetKind::Launch)
            .await
            .unwrap();
        assert_eq!(launch.file_extension, ".bundle");
        assert_eq!(launch.content_type, "application/javascript");

        let err = ctx
            .describe("assets/missing", AssetKind::Declared { ext: "png" })
            .await
            .unwrap_err();
        assert!(matches!(err, UpdatesError::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn resolves_served_content_types() {
        let (store, _) = fixture().await;
        let store = store.as_ref();

        let launch = resolve_asset(
            store,
            Some("/srv/updates/1.0.0/1700000500/bundles/android-abc.hbc"),
            Some("1.0.0"),
            Some("android"),
        )
        .await
        .unwrap();
        assert_eq!(launch.content_type, "application/javascript");

        let font = resolve_asset(
            store,
            Some("/srv/updates/1.0.0/1700000500/assets/99aa"),
            Some("1.0.0"),
            Some("android"),
        )
        .await
        .unwrap();
        assert_eq!(font.content_type, content_type_for_ext("ttf"));
    }

    #[tokio::test]
    async fn serves_files_from_earlier_bundles() {
        let (store, _) = fixture().await;
        let previous = store.bundle_path("1.0.0", "1700000000");
        store
            .insert_file(
                previous.join(METADATA_FILE),
                r#"{"fileMetadata":{"android":{"bundle":"bundles/android-old.hbc","assets":[{"path":"assets/a","ext":"ttf"}]}}}"#,
            )
            .await;
        store
            .insert_file(previous.join("bundles/android-old.hbc"), "old launch")
            .await;
        store.insert_file(previous.join("assets/a"), "font").await;
        store.insert_file(previous.join("notes.txt"), "loose").await;
        let store = store.as_ref();

        let font = resolve_asset(
            store,
            Some("/srv/updates/1.0.0/1700000000/assets/a"),
            Some("1.0.0"),
            Some("android"),
        )
        .await
        .unwrap();
        assert_eq!(font.path, previous.join("assets/a"));
        assert_eq!(font.content_type, content_type_for_ext("ttf"));

        let launch = resolve_asset(
            store,
            Some("/srv/updates/1.0.0/1700000000/bundles/android-old.hbc"),
            Some("1.0.0"),
            Some("android"),
        )
        .await
        .unwrap();
        assert_eq!(launch.content_type, "application/javascript");

        let loose = resolve_asset(
            store,
            Some("/srv/updates/1.0.0/1700000000/notes.txt"),
            Some("1.0.0"),
            Some("ios"),
        )
        .await
        .unwrap();
        assert_eq!(loose.content_type, "text/plain");

        let err = resolve_asset(
            store,
            Some("/srv/updates/1.0.0/1700000000/assets/gone"),
            Some("1.0.0"),
            Some("android"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UpdatesError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_bad_asset_requests() {
        let (store, _) = fixture().await;
        let store = store.as_ref();

        let err = resolve_asset(store, None, Some("1.0.0"), Some("android"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No asset name provided.");

        let err = resolve_asset(store, Some("/x"), Some("1.0.0"), Some("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdatesError::InvalidRequest(_)));

        let err = resolve_asset(store, Some("/x"), Some(""), Some("ios"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No runtimeVersion provided.");

        let err = resolve_asset(
            store,
            Some("/abs/path/to/missing.png"),
            Some("1.0.0"),
            Some("android"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UpdatesError::NotFound(_)));
        assert!(err.to_string().contains("/abs/path/to/missing.png"));

        let err = resolve_asset(
            store,
            Some("/srv/updates/1.0.0/1700000500/../../../etc/passwd"),
            Some("1.0.0"),
            Some("android"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UpdatesError::NotFound(_)));

        let err = resolve_asset(
            store,
            Some("/srv/updates/2.0.0/1700000500/assets/4f1c"),
            Some("1.0.0"),
            Some("android"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, UpdatesError::NotFound(_)));
    }
}
