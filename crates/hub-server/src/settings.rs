//! Hub-wide configuration (§6 "Environment variables", §11.3): resolved once
//! at startup in the teacher's layered order — CLI flag > env var > default —
//! and threaded through the router as shared state, the way the teacher
//! threads `SessionRegistry` via `with_state`.

use std::net::SocketAddr;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind_addr: SocketAddr,
    pub auth_token: String,
    pub cors_allowed_origins: Vec<String>,
    pub dvm_bin: String,
    pub daemon_ready_timeout_ms: u64,
    pub daemon_ready_timeout_after_upgrade_ms: u64,
    pub seed_prompt_ready_timeout_ms: u64,
    pub repo_seed_timeout_ms: u64,
    pub seed_bootstrap_timeout_ms: u64,
    pub prompt_enqueue_timeout_ms: u64,
    pub provision_concurrency: usize,
    pub reconcile_concurrency: usize,
    pub pending_prompt_pump_concurrency: usize,
    pub agent_cmd_overrides: AgentCmdOverrides,
    pub shell_cmd: String,
}

#[derive(Debug, Clone, Default)]
pub struct AgentCmdOverrides {
    pub cursor: Option<String>,
    pub codex: Option<String>,
    pub claude: Option<String>,
    pub opencode: Option<String>,
    pub default: Option<String>,
}

impl AgentCmdOverrides {
    pub fn resolve(&self, agent: drone_hub_protocol::BuiltinAgent) -> String {
        use drone_hub_protocol::BuiltinAgent::*;
        let specific = match agent {
            Cursor => self.cursor.clone(),
            Codex => self.codex.clone(),
            Claude => self.claude.clone(),
            Opencode => self.opencode.clone(),
        };
        specific
            .or_else(|| self.default.clone())
            .unwrap_or_else(|| agent.as_str().to_string())
    }
}

/// Clamp a millisecond env var into `[min, max]`, warning when the provided
/// value was out of range (§6).
fn clamped_env_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(v) => {
                let clamped = v.clamp(min, max);
                if clamped != v {
                    warn!(
                        component = "settings",
                        event = "settings.clamped",
                        var = name,
                        provided = v,
                        clamped,
                        "environment value clamped to allowed range"
                    );
                }
                clamped
            }
            Err(_) => {
                warn!(component = "settings", event = "settings.invalid", var = name, raw = %raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_usize(name: &str, default: usize, min: usize, max: usize) -> usize {
    clamped_env_u64(name, default as u64, min as u64, max as u64) as usize
}

impl HubConfig {
    pub fn resolve(bind_addr: SocketAddr, auth_token: String) -> Self {
        let cors_allowed_origins = std::env::var("DRONE_HUB_CORS_ORIGINS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        HubConfig {
            bind_addr,
            auth_token,
            cors_allowed_origins,
            dvm_bin: std::env::var("DRONE_HUB_DVM_BIN").unwrap_or_else(|_| "dvm".to_string()),
            daemon_ready_timeout_ms: clamped_env_u64(
                "DRONE_HUB_DAEMON_READY_TIMEOUT_MS",
                20_000,
                1_000,
                120_000,
            ),
            daemon_ready_timeout_after_upgrade_ms: 30_000,
            seed_prompt_ready_timeout_ms: 120_000,
            repo_seed_timeout_ms: clamped_env_u64(
                "DRONE_HUB_REPO_SEED_TIMEOUT_MS",
                60_000,
                1_000,
                600_000,
            ),
            seed_bootstrap_timeout_ms: clamped_env_u64(
                "DRONE_HUB_SEED_BOOTSTRAP_TIMEOUT_MS",
                60_000,
                1_000,
                600_000,
            ),
            prompt_enqueue_timeout_ms: clamped_env_u64(
                "DRONE_HUB_PROMPT_ENQUEUE_TIMEOUT_MS",
                180_000,
                30_000,
                1_800_000,
            ),
            provision_concurrency: env_usize("DRONE_HUB_PROVISION_CONCURRENCY", 3, 1, 16),
            reconcile_concurrency: env_usize("DRONE_HUB_RECONCILE_CONCURRENCY", 6, 1, 32),
            pending_prompt_pump_concurrency: env_usize(
                "DRONE_HUB_PENDING_PROMPT_PUMP_CONCURRENCY",
                6,
                1,
                32,
            ),
            agent_cmd_overrides: AgentCmdOverrides {
                cursor: std::env::var("DRONE_HUB_CURSOR_CMD").ok(),
                codex: std::env::var("DRONE_HUB_CODEX_CMD").ok(),
                claude: std::env::var("DRONE_HUB_CLAUDE_CMD").ok(),
                opencode: std::env::var("DRONE_HUB_OPENCODE_CMD").ok(),
                default: std::env::var("DRONE_HUB_AGENT_CMD").ok(),
            },
            shell_cmd: std::env::var("DRONE_HUB_SHELL_CMD").unwrap_or_else(|_| "bash".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_below_min() {
        std::env::set_var("DRONE_HUB_TEST_CLAMP_LOW", "10");
        assert_eq!(clamped_env_u64("DRONE_HUB_TEST_CLAMP_LOW", 500, 100, 1000), 100);
        std::env::remove_var("DRONE_HUB_TEST_CLAMP_LOW");
    }

    #[test]
    fn clamps_above_max() {
        std::env::set_var("DRONE_HUB_TEST_CLAMP_HIGH", "999999");
        assert_eq!(clamped_env_u64("DRONE_HUB_TEST_CLAMP_HIGH", 500, 100, 1000), 1000);
        std::env::remove_var("DRONE_HUB_TEST_CLAMP_HIGH");
    }

    #[test]
    fn agent_cmd_overrides_fall_back_to_default_then_name() {
        let overrides = AgentCmdOverrides {
            cursor: Some("my-cursor".to_string()),
            ..Default::default()
        };
        assert_eq!(overrides.resolve(drone_hub_protocol::BuiltinAgent::Cursor), "my-cursor");
        assert_eq!(overrides.resolve(drone_hub_protocol::BuiltinAgent::Codex), "codex");
    }
}
