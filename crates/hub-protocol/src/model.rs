//! Core domain types shared across the hub: drones, chats, turns and the
//! tagged unions called out in the design notes for fields that were
//! dynamically typed in the system this hub is modeled on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A coding-agent CLI that can be driven inside a drone's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Agent {
    Builtin { id: BuiltinAgent },
    Custom {
        id: String,
        label: String,
        command: String,
    },
}

impl Default for Agent {
    fn default() -> Self {
        Agent::Builtin {
            id: BuiltinAgent::Cursor,
        }
    }
}

/// Unknown variants at the registry boundary default to `Cursor`, matching
/// the behavior of the system this hub replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinAgent {
    Cursor,
    Codex,
    Claude,
    Opencode,
}

impl BuiltinAgent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinAgent::Cursor => "cursor",
            BuiltinAgent::Codex => "codex",
            BuiltinAgent::Claude => "claude",
            BuiltinAgent::Opencode => "opencode",
        }
    }

    /// Agents whose session id is discovered only after the first turn and
    /// therefore require the prompt-pipeline defer policy (§4.6).
    pub fn requires_session_discipline(&self) -> bool {
        matches!(self, BuiltinAgent::Codex | BuiltinAgent::Opencode)
    }
}

/// State of a queued prompt. Unknown variants default to `Sending`,
/// matching prior behavior at the registry boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptState {
    Queued,
    Sending,
    Sent,
    Failed,
}

impl Default for PromptState {
    fn default() -> Self {
        PromptState::Sending
    }
}

/// State of a job as reported by the in-container daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
}

/// Phase of a pending (not-yet-provisioned) drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPhase {
    Starting,
    Creating,
    Seeding,
    Error,
}

/// Transient hub-surfaced status on a live drone. Absence means "normal."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubPhase {
    Starting,
    Seeding,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubMeta {
    pub phase: HubPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveRetention {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
}

impl ArchiveRetention {
    pub fn duration_secs(&self) -> i64 {
        match self {
            ArchiveRetention::OneHour => 3_600,
            ArchiveRetention::EightHours => 8 * 3_600,
            ArchiveRetention::OneDay => 24 * 3_600,
            ArchiveRetention::OneWeek => 7 * 24 * 3_600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveRuntimePolicy {
    KeepRunning,
    Stop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoMeta {
    pub dest: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeded_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pull: Option<LastPull>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPull {
    pub mode: PullMode,
    pub at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_head_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_files: Option<Vec<String>>,
    pub base_advanced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullMode {
    NoChanges,
    BundleMergeNoCommit,
    HostConflictsReady,
}

/// A single turn appended to a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub id: String,
    pub prompt: String,
    pub ok: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A persisted intent to run a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPrompt {
    pub id: String,
    pub at: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub state: PromptState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: String,
}

/// A logical conversation scope within a drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub created_at: String,
    pub agent: Agent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codex_thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claude_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_code_session_id: Option<String>,
    pub turns: Vec<Turn>,
    pub pending_prompts: Vec<PendingPrompt>,
}

impl Chat {
    pub fn new(agent: Agent, now: &str) -> Self {
        Chat {
            created_at: now.to_string(),
            agent,
            model: None,
            chat_id: None,
            codex_thread_id: None,
            claude_session_id: None,
            open_code_session_id: None,
            turns: Vec::new(),
            pending_prompts: Vec::new(),
        }
    }

    /// `inferChatAgent` order: explicit agent -> claudeSessionId ->
    /// openCodeSessionId -> codexThreadId -> legacy chatId -> default cursor.
    pub fn inferred_agent_kind(&self) -> BuiltinAgent {
        if let Agent::Builtin { id } = &self.agent {
            return *id;
        }
        if self.claude_session_id.is_some() {
            BuiltinAgent::Claude
        } else if self.open_code_session_id.is_some() {
            BuiltinAgent::Opencode
        } else if self.codex_thread_id.is_some() {
            BuiltinAgent::Codex
        } else if self.chat_id.is_some() {
            BuiltinAgent::Cursor
        } else {
            BuiltinAgent::Cursor
        }
    }

    pub fn known_session_id(&self) -> Option<&str> {
        match self.inferred_agent_kind() {
            BuiltinAgent::Cursor => self.chat_id.as_deref(),
            BuiltinAgent::Codex => self.codex_thread_id.as_deref(),
            BuiltinAgent::Claude => self.claude_session_id.as_deref(),
            BuiltinAgent::Opencode => self.open_code_session_id.as_deref(),
        }
    }
}

/// A live, fully provisioned drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drone {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub container_name: String,
    pub container_port: u16,
    pub host_port: u16,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<RepoMeta>,
    pub cwd: String,
    pub chats: HashMap<String, Chat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<HubMeta>,
    pub created_at: String,
}

/// A drone seed directive carried on a pending entry (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSpec {
    pub chat_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
}

/// A drone not yet provisioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDrone {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    pub container_port: u16,
    pub build: bool,
    pub phase: PendingPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_chats: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<SeedSpec>,
}

/// A snapshot of a deleted-but-retained drone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedDrone {
    #[serde(flatten)]
    pub drone: Drone,
    pub archived_at: String,
    pub delete_at: String,
    pub archive_retention: ArchiveRetention,
    pub archive_runtime_policy: ArchiveRuntimePolicy,
}

/// A daemon job's reported state, as returned by `promptGet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

/// The settings object persisted in the registry (§2 "Hub Env & Settings").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_action_default: Option<String>,
}

/// Top-level persisted document (§6 "Registry file").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    pub drones: HashMap<String, Drone>,
    pub pending: HashMap<String, PendingDrone>,
    pub archived: HashMap<String, ArchivedDrone>,
    pub groups: Vec<String>,
    pub repos: HashMap<String, serde_json::Value>,
    pub settings: Settings,
}
