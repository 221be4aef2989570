//! The Container CLI Adapter abstract interface (§4.3): a thin trait over
//! the external container-management tool. The hub server ships the only
//! production implementation, shelling out to that tool; tests use an
//! in-memory fake.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::ConnectorError;

#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Port {
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct SessionReadResult {
    pub text: String,
    pub next_offset: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CreateArgs {
    pub name: String,
    pub container_port: u16,
    pub group: Option<String>,
    pub repo_path: Option<String>,
    pub cwd: Option<String>,
    pub mkdir: bool,
    pub build: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RepoSeedArgs {
    pub host_path: String,
    pub dest: String,
    pub base_ref: String,
    pub branch: String,
    pub clean: bool,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RepoExportArgs {
    pub repo_path_in_container: String,
    pub out_dir: String,
    pub base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RepoExportResult {
    pub exported_path: String,
}

#[async_trait]
pub trait ContainerAdapter: Send + Sync {
    async fn ls(&self) -> Result<HashSet<String>, ConnectorError>;

    /// `drone create` (§4.5 step 3). `AlreadyRunning` from the CLI's
    /// "already exists" message signals the caller should retry via
    /// [`ContainerAdapter::import`] instead.
    async fn create(&self, args: CreateArgs) -> Result<(), ConnectorError>;

    async fn import(&self, args: CreateArgs) -> Result<(), ConnectorError>;

    async fn exec(
        &self,
        container: &str,
        cmd: &str,
        args: &[String],
        timeout_ms: Option<u64>,
    ) -> Result<ExecOutcome, ConnectorError>;

    async fn copy_to(
        &self,
        container: &str,
        host_path: &str,
        container_path: &str,
    ) -> Result<(), ConnectorError>;

    async fn ports(&self, container: &str) -> Result<Vec<Port>, ConnectorError>;

    async fn session_start(
        &self,
        container: &str,
        session: &str,
        cmd: &str,
        args: &[String],
        reuse: bool,
    ) -> Result<(), ConnectorError>;

    async fn session_type(
        &self,
        container: &str,
        session: &str,
        text: Option<&str>,
        keys: &[String],
    ) -> Result<(), ConnectorError>;

    async fn session_read(
        &self,
        container: &str,
        session: &str,
        since: Option<u64>,
        max_bytes: Option<u64>,
        tail_lines: Option<u32>,
    ) -> Result<SessionReadResult, ConnectorError>;

    async fn repo_seed(&self, container: &str, args: RepoSeedArgs) -> Result<(), ConnectorError>;

    async fn repo_export(
        &self,
        container: &str,
        args: RepoExportArgs,
    ) -> Result<RepoExportResult, ConnectorError>;

    async fn repo_head_sha(&self, container: &str) -> Result<String, ConnectorError>;

    async fn repo_set_base_sha(&self, container: &str, sha: &str) -> Result<(), ConnectorError>;

    async fn base_set(&self, container: &str, timeout_ms: Option<u64>) -> Result<(), ConnectorError>;

    async fn remove(&self, container: &str, keep_volume: bool) -> Result<(), ConnectorError>;

    async fn start(&self, container: &str) -> Result<(), ConnectorError>;

    async fn stop(&self, container: &str) -> Result<(), ConnectorError>;
}
