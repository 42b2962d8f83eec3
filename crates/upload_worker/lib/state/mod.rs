use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::upload_service::PgStore;

pub struct AppState<S = PgStore> {
    pub store: S,
    pub shutdown_token: CancellationToken,
    pub registry: RwLock<Registry>,
}

impl<S> AppState<S> {
    pub fn new(store: S, shutdown_token: CancellationToken) -> Self {
        Self {
            store,
            shutdown_token,
            registry: RwLock::new(<Registry>::default()),
        }
    }
}
