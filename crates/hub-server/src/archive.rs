//! Archive sweeper (§5 "Archive sweep runs every 5 minutes, ≤25 deletions
//! per run"): reaps `ArchivedDrone`s whose retention window has elapsed.

use tracing::{info, warn};

use crate::app_state::SharedState;
use crate::error::ApiError;
use crate::time;

const MAX_DELETIONS_PER_SWEEP: usize = 25;

/// One sweep pass: find archived drones past `deleteAt`, remove their
/// container (unless the archive's runtime policy is `keep-running`), and
/// drop them from the registry.
pub async fn sweep(state: &SharedState) {
    let now = time::now_iso();
    let reg = state.registry.load();

    let mut due: Vec<String> = reg
        .archived
        .values()
        .filter(|a| a.delete_at.as_str() <= now.as_str())
        .map(|a| a.drone.id.clone())
        .collect();
    due.truncate(MAX_DELETIONS_PER_SWEEP);

    if due.is_empty() {
        return;
    }

    for id in due {
        if let Err(e) = reap_one(state, &id).await {
            warn!(component = "archive", event = "archive.sweep.failed", id = %id, error = %e);
        }
    }
}

async fn reap_one(state: &SharedState, id: &str) -> Result<(), ApiError> {
    let reg = state.registry.load();
    let Some(archived) = reg.archived.get(id).cloned() else {
        return Ok(());
    };

    if archived.archive_runtime_policy != drone_hub_protocol::ArchiveRuntimePolicy::KeepRunning {
        if let Err(e) = state.container.remove(&archived.drone.container_name, false).await {
            warn!(component = "archive", event = "archive.sweep.container_remove_failed", id = %id, error = %e);
        }
    }

    state.registry.update::<_, _, ApiError>(|reg| {
        reg.archived.remove(id);
        Ok(())
    })?;

    info!(component = "archive", event = "archive.sweep.deleted", id = %id);
    Ok(())
}

/// Spawn the periodic ticker. Runs for the lifetime of the server.
pub fn spawn_sweeper(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5 * 60));
        loop {
            interval.tick().await;
            sweep(&state).await;
        }
    });
}
