//! Shared application state threaded through the router as `axum::State`,
//! mirroring how the teacher threads `Arc<SessionRegistry>`.

use std::sync::Arc;
use std::time::Duration;

use drone_hub_connector_core::container::ContainerAdapter;
use drone_hub_connector_core::daemon::DaemonClient;
use drone_hub_protocol::Drone;

use crate::container_adapter::DvmContainerAdapter;
use crate::daemon_client::HttpDaemonClient;
use crate::oplock::DroneOpLock;
use crate::registry::RegistryStore;
use crate::settings::HubConfig;
use crate::ttl_cache::TtlCache;
use crate::worker_pool::WorkerPool;

pub struct AppState {
    pub registry: RegistryStore,
    pub oplock: DroneOpLock,
    pub container: Arc<dyn ContainerAdapter>,
    pub config: HubConfig,
    pub provisioning: WorkerPool<String>,
    pub reconcile: WorkerPool<(String, String)>,
    pub pending_pump: WorkerPool<(String, String)>,
    /// 25s TTL cache for pull-preview `merge-tree` results (§4.9, §5).
    pub pull_preview_cache: TtlCache<String, serde_json::Value>,
    /// 5min TTL cache for per-agent model discovery (§5).
    pub model_cache: TtlCache<String, Vec<String>>,
}

impl AppState {
    /// Build a daemon client for a specific drone from its recorded
    /// `hostPort`/`token` (§4.4).
    pub fn daemon_client_for(&self, drone: &Drone) -> HttpDaemonClient {
        HttpDaemonClient::new(format!("http://127.0.0.1:{}", drone.host_port), drone.token.clone())
    }

    pub fn dyn_daemon_client_for(&self, drone: &Drone) -> Arc<dyn DaemonClient> {
        Arc::new(self.daemon_client_for(drone))
    }
}

pub type SharedState = Arc<AppState>;

pub fn new_container_adapter(bin: &str) -> Arc<dyn ContainerAdapter> {
    Arc::new(DvmContainerAdapter::new(bin))
}

pub const PULL_PREVIEW_TTL: Duration = Duration::from_secs(25);
pub const MODEL_DISCOVERY_TTL: Duration = Duration::from_secs(300);
