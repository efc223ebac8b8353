use std::cmp::Ordering;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Result, StoreError, UpdatesError};
use crate::store::BundleStore;

/// Location of one published bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRef {
    pub runtime_version: String,
    /// Directory name, an all-digit publish timestamp.
    pub name: String,
    pub path: PathBuf,
}

/// Picks the newest bundle for `runtime_version`: the numerically largest
/// purely-numeric directory name.
pub async fn resolve_latest(store: &dyn BundleStore, runtime_version: &str) -> Result<BundleRef> {
    if !is_plain_segment(runtime_version) {
        return Err(UpdatesError::not_found("Unsupported runtime version"));
    }

    let names = match store.list_bundle_versions(runtime_version).await {
        Ok(names) => names,
        Err(StoreError::NotFound(_)) => {
            return Err(UpdatesError::not_found("Unsupported runtime version"))
        }
        Err(err) => return Err(err.into()),
    };

    let name = names
        .into_iter()
        .filter(|name| is_timestamp(name))
        .max_by(|a, b| numeric_cmp(a, b))
        .ok_or_else(|| UpdatesError::not_found("No updates found for runtime version"))?;

    let path = store.bundle_path(runtime_version, &name);
    debug!(runtime_version, bundle = %path.display(), "resolved latest bundle");
    Ok(BundleRef {
        runtime_version: runtime_version.to_string(),
        name,
        path,
    })
}

pub(crate) fn is_timestamp(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Orders all-digit strings by value without bounding their width.
fn numeric_cmp(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn is_plain_segment(value: &str) -> bool {
    !value.is_empty() && value != "." && value != ".." && !value.contains(['/', '\\'])
}
