use std::sync::Arc;

use expo_updates_core::{BundleStore, ProtocolConfig, UpdateProtocol};

#[derive(Clone)]
pub struct AppState {
    protocol: UpdateProtocol,
}

impl AppState {
    pub fn new(store: Arc<dyn BundleStore>, config: ProtocolConfig) -> Self {
        Self {
            protocol: UpdateProtocol::new(store, config),
        }
    }

    pub fn protocol(&self) -> &UpdateProtocol {
        &self.protocol
    }

    pub fn store(&self) -> &dyn BundleStore {
        self.protocol.store()
    }
}
