//! Expo Updates protocol engine: bundle resolution, manifest and directive
//! construction, code signing and multipart framing.

pub mod asset;
pub mod directive;
pub mod error;
pub mod metadata;
pub mod multipart;
pub mod protocol;
pub mod resolver;
pub mod signing;
pub mod store;

pub use asset::{resolve_asset, AssetDescriptor, ResolvedAsset};
pub use directive::Directive;
pub use error::{ErrorClass, Result, StoreError, UpdatesError};
pub use protocol::{
    Decision, Manifest, Platform, ProtocolConfig, ProtocolRequest, ProtocolResponse,
    RawProtocolRequest, ResponseKind, UpdateProtocol,
};
pub use resolver::{resolve_latest, BundleRef};
pub use store::{BundleStore, FsBundleStore, InMemoryBundleStore};
