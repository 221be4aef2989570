//! HTTP request/response DTOs for the `/api` surface (§6).

use serde::{Deserialize, Serialize};

use crate::model::{Agent, ArchiveRetention, ArchiveRuntimePolicy, Drone, PendingDrone, PendingPhase};

/// Canonical envelope for every JSON response: `{ok, ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(body: T) -> Self {
        Envelope { ok: true, body }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_files: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDroneRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub repo_path: Option<String>,
    #[serde(default)]
    pub container_port: Option<u16>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub mkdir: Option<bool>,
    #[serde(default)]
    pub no_build: Option<bool>,
    #[serde(default)]
    pub clone_from: Option<String>,
    #[serde(default)]
    pub clone_chats: Option<bool>,
    #[serde(default)]
    pub seed: Option<crate::model::SeedSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDroneResponse {
    pub id: String,
    pub phase: PendingPhase,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchCreateDroneRequest {
    pub drones: Vec<CreateDroneRequest>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneListEntry {
    #[serde(flatten)]
    pub drone: DroneOrPending,
    pub status_ok: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DroneOrPending {
    Live(Drone),
    Pending(PendingDrone),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameDroneRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDroneRequest {
    #[serde(default)]
    pub retention: Option<ArchiveRetention>,
    #[serde(default)]
    pub runtime_policy: Option<ArchiveRuntimePolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetGroupRequest {
    pub ids: Vec<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameGroupRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfigRequest {
    #[serde(default)]
    pub agent: Option<Agent>,
    #[serde(default)]
    pub set_model: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInput {
    pub filename: String,
    /// `data:<mime>;base64,<data>` URI.
    pub data_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<AttachmentInput>>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub id: String,
    pub state: crate::model::PromptState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalOpenRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub chat: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminalOpenResponse {
    pub session: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalInputRequest {
    pub data: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdateRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteActionSettingRequest {
    pub default: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    pub mode: crate::model::PullMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_changes: Option<bool>,
    pub base_advanced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NameStatusEntry {
    pub path: String,
    pub status: String,
}
