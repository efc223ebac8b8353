use serde::Serialize;

use crate::error::{Result, StoreError, UpdatesError};
use crate::metadata::iso8601;
use crate::resolver::BundleRef;
use crate::store::BundleStore;

pub const ROLLBACK_MARKER: &str = "rollback";

/// Non-manifest instruction sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Directive {
    RollBackToEmbedded { parameters: RollbackParameters },
    NoUpdateAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackParameters {
    pub commit_time: String,
}

pub async fn has_rollback_marker(store: &dyn BundleStore, bundle: &BundleRef) -> bool {
    store.exists(&bundle.path.join(ROLLBACK_MARKER)).await
}

/// Builds a rollback directive whose commit time is the creation time of the
/// bundle's `rollback` marker.
pub async fn build_rollback(store: &dyn BundleStore, bundle: &BundleRef) -> Result<Directive> {
    let marker = bundle.path.join(ROLLBACK_MARKER);
    let created = match store.created_at(&marker).await {
        Ok(created) => created,
        Err(StoreError::NotFound(_)) => return Err(UpdatesError::not_found("No rollback found")),
        Err(err) => return Err(err.into()),
    };
    Ok(Directive::RollBackToEmbedded {
        parameters: RollbackParameters {
            commit_time: iso8601(created),
        },
    })
}

pub fn build_no_update() -> Directive {
    Directive::NoUpdateAvailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBundleStore;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{Duration, UNIX_EPOCH};

    fn bundle() -> BundleRef {
        BundleRef {
            runtime_version: "1.0.0".into(),
            name: "1".into(),
            path: PathBuf::from("/updates/1.0.0/1"),
        }
    }

    #[test]
    fn no_update_wire_shape() {
        assert_eq!(
            serde_json::to_value(build_no_update()).unwrap(),
            json!({ "type": "noUpdateAvailable" })
        );
    }

    #[tokio::test]
    async fn rollback_uses_marker_creation_time() {
        let store = InMemoryBundleStore::new("/updates");
        assert!(!has_rollback_marker(store.as_ref(), &bundle()).await);
        let err = build_rollback(store.as_ref(), &bundle()).await.unwrap_err();
        assert_eq!(err.to_string(), "No rollback found");

        store
            .insert_file_at(
                bundle().path.join(ROLLBACK_MARKER),
                Vec::new(),
                UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            )
            .await;
        assert!(has_rollback_marker(store.as_ref(), &bundle()).await);

        let directive = build_rollback(store.as_ref(), &bundle()).await.unwrap();
        assert_eq!(
            serde_json::to_value(&directive).unwrap(),
            json!({
                "type": "rollBackToEmbedded",
                "parameters": { "commitTime": "2023-11-14T22:13:20.000Z" }
            })
        );
    }
}
