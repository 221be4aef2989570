//! `findDroneIdByRef` (§4.10): every route resolves a drone by id-or-name
//! before doing anything else, uniformly turning "doesn't exist" and "exists
//! only in pending" into the canonical 404/409 pair.

use drone_hub_protocol::Registry;

use crate::error::ApiError;

pub enum DroneRef {
    Live(String),
    Pending(String),
}

/// Resolve `id_or_name` against `drones` first (by id, then by name), then
/// `pending` (by id, then by name). `archived` drones are not addressable
/// through this lookup — the archive endpoints look them up directly.
pub fn find_drone_ref(reg: &Registry, id_or_name: &str) -> Option<DroneRef> {
    if reg.drones.contains_key(id_or_name) {
        return Some(DroneRef::Live(id_or_name.to_string()));
    }
    if let Some(d) = reg.drones.values().find(|d| d.name == id_or_name) {
        return Some(DroneRef::Live(d.id.clone()));
    }
    if reg.pending.contains_key(id_or_name) {
        return Some(DroneRef::Pending(id_or_name.to_string()));
    }
    if let Some(p) = reg.pending.values().find(|p| p.name == id_or_name) {
        return Some(DroneRef::Pending(p.id.clone()));
    }
    None
}

/// Resolve to a live drone id, or the canonical 404/409 `ApiError`.
pub fn require_live_drone_id(reg: &Registry, id_or_name: &str) -> Result<String, ApiError> {
    match find_drone_ref(reg, id_or_name) {
        Some(DroneRef::Live(id)) => Ok(id),
        Some(DroneRef::Pending(_)) => Err(ApiError::StillStarting),
        None => Err(ApiError::NotFound(format!("drone {id_or_name:?}"))),
    }
}

/// `name` uniqueness invariant (§3): unique across `drones ∪ pending ∪ archived`.
pub fn name_taken(reg: &Registry, name: &str) -> bool {
    reg.drones.values().any(|d| d.name == name)
        || reg.pending.values().any(|p| p.name == name)
        || reg.archived.values().any(|a| a.drone.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_hub_protocol::{Drone, PendingDrone, PendingPhase};
    use std::collections::HashMap;

    fn drone(id: &str, name: &str) -> Drone {
        Drone {
            id: id.to_string(),
            name: name.to_string(),
            group: None,
            container_name: format!("c-{id}"),
            container_port: 3000,
            host_port: 40000,
            token: "tok".to_string(),
            repo_path: None,
            repo: None,
            cwd: "/work".to_string(),
            chats: HashMap::new(),
            hub: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn pending(id: &str, name: &str) -> PendingDrone {
        PendingDrone {
            id: id.to_string(),
            name: name.to_string(),
            group: None,
            repo_path: None,
            container_port: 3000,
            build: true,
            phase: PendingPhase::Starting,
            message: String::new(),
            error: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            clone_from: None,
            clone_chats: None,
            seed: None,
        }
    }

    #[test]
    fn resolves_live_by_id_or_name() {
        let mut reg = Registry::default();
        reg.drones.insert("d1".to_string(), drone("d1", "alpha"));
        assert!(matches!(find_drone_ref(&reg, "d1"), Some(DroneRef::Live(id)) if id == "d1"));
        assert!(matches!(find_drone_ref(&reg, "alpha"), Some(DroneRef::Live(id)) if id == "d1"));
    }

    #[test]
    fn resolves_pending_as_still_starting() {
        let mut reg = Registry::default();
        reg.pending.insert("p1".to_string(), pending("p1", "beta"));
        assert!(matches!(require_live_drone_id(&reg, "beta"), Err(ApiError::StillStarting)));
    }

    #[test]
    fn unknown_ref_is_not_found() {
        let reg = Registry::default();
        assert!(matches!(require_live_drone_id(&reg, "nope"), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn name_taken_checks_all_three_maps() {
        let mut reg = Registry::default();
        reg.drones.insert("d1".to_string(), drone("d1", "alpha"));
        assert!(name_taken(&reg, "alpha"));
        assert!(!name_taken(&reg, "zulu"));
    }
}
