//! Production `ContainerAdapter` (§4.3): shells out to the `dvm` CLI the
//! way `git.rs` shells out to `/usr/bin/git` and `shell.rs` shells out to
//! `sh -c`.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use drone_hub_connector_core::container::{
    ContainerAdapter, CreateArgs, ExecOutcome, Port, RepoExportArgs, RepoExportResult, RepoSeedArgs,
    SessionReadResult,
};
use drone_hub_connector_core::error::{classify_container_message, ConnectorError};
use tokio::process::Command;
use tracing::{debug, warn};

const DEFAULT_NODE_CLI_TIMEOUT: Duration = Duration::from_secs(600);

fn create_args_with_subcommand(subcommand: &str, args: &CreateArgs) -> Vec<String> {
    let mut full_args = vec![
        subcommand.to_string(),
        args.name.clone(),
        "--port".to_string(),
        args.container_port.to_string(),
    ];
    if let Some(group) = &args.group {
        full_args.push("--group".to_string());
        full_args.push(group.clone());
    }
    if let Some(repo_path) = &args.repo_path {
        full_args.push("--repo".to_string());
        full_args.push(repo_path.clone());
    }
    if let Some(cwd) = &args.cwd {
        full_args.push("--cwd".to_string());
        full_args.push(cwd.clone());
    }
    if args.mkdir {
        full_args.push("--mkdir".to_string());
    }
    if !args.build {
        full_args.push("--no-build".to_string());
    }
    full_args
}

pub struct DvmContainerAdapter {
    bin: String,
}

impl DvmContainerAdapter {
    pub fn new(bin: impl Into<String>) -> Self {
        DvmContainerAdapter { bin: bin.into() }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<ExecOutcome, ConnectorError> {
        let bin = self.bin.clone();
        let owned_args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let fut = async move {
            Command::new(&bin)
                .args(&owned_args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
        };

        let output = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| ConnectorError::Timeout(timeout.as_millis() as u64))?
            .map_err(ConnectorError::Io)?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        if code != 0 {
            if let Some(classified) = classify_container_message(&stderr) {
                debug!(component = "container_adapter", event = "container.classified_error", code, stderr = %stderr);
                return Err(classified);
            }
        }

        Ok(ExecOutcome { code, stdout, stderr })
    }
}

#[async_trait]
impl ContainerAdapter for DvmContainerAdapter {
    async fn ls(&self) -> Result<HashSet<String>, ConnectorError> {
        let out = self.run(&["ls", "--format", "json"], Duration::from_secs(30)).await?;
        let names: Vec<String> = serde_json::from_str(&out.stdout).unwrap_or_default();
        Ok(names.into_iter().collect())
    }

    async fn create(&self, args: CreateArgs) -> Result<(), ConnectorError> {
        let full_args = create_args_with_subcommand("create", &args);
        let refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
        self.run(&refs, Duration::from_secs(600)).await?;
        Ok(())
    }

    async fn import(&self, args: CreateArgs) -> Result<(), ConnectorError> {
        let full_args = create_args_with_subcommand("import", &args);
        let refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
        self.run(&refs, Duration::from_secs(600)).await?;
        Ok(())
    }

    async fn exec(
        &self,
        container: &str,
        cmd: &str,
        args: &[String],
        timeout_ms: Option<u64>,
    ) -> Result<ExecOutcome, ConnectorError> {
        let timeout = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(30));
        let mut full_args = vec!["exec".to_string(), container.to_string(), cmd.to_string()];
        full_args.extend(args.iter().cloned());
        let refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
        self.run(&refs, timeout).await
    }

    async fn copy_to(
        &self,
        container: &str,
        host_path: &str,
        container_path: &str,
    ) -> Result<(), ConnectorError> {
        self.run(
            &["copy-to", container, host_path, container_path],
            Duration::from_secs(60),
        )
        .await?;
        Ok(())
    }

    async fn ports(&self, container: &str) -> Result<Vec<Port>, ConnectorError> {
        let out = self
            .run(&["ports", container, "--format", "json"], Duration::from_secs(10))
            .await?;
        #[derive(serde::Deserialize)]
        struct Raw {
            host_port: u16,
            container_port: u16,
        }
        let raw: Vec<Raw> = serde_json::from_str(&out.stdout).unwrap_or_default();
        Ok(raw
            .into_iter()
            .map(|r| Port {
                host_port: r.host_port,
                container_port: r.container_port,
            })
            .collect())
    }

    async fn session_start(
        &self,
        container: &str,
        session: &str,
        cmd: &str,
        args: &[String],
        reuse: bool,
    ) -> Result<(), ConnectorError> {
        let mut full_args = vec!["session-start".to_string(), container.to_string(), session.to_string()];
        if reuse {
            full_args.push("--reuse".to_string());
        }
        full_args.push(cmd.to_string());
        full_args.extend(args.iter().cloned());
        let refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
        self.run(&refs, Duration::from_secs(15)).await?;
        Ok(())
    }

    async fn session_type(
        &self,
        container: &str,
        session: &str,
        text: Option<&str>,
        keys: &[String],
    ) -> Result<(), ConnectorError> {
        let mut full_args = vec!["session-type".to_string(), container.to_string(), session.to_string()];
        if let Some(t) = text {
            full_args.push("--text".to_string());
            full_args.push(t.to_string());
        }
        for key in keys {
            full_args.push("--key".to_string());
            full_args.push(key.clone());
        }
        let refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
        self.run(&refs, Duration::from_secs(10)).await?;
        Ok(())
    }

    async fn session_read(
        &self,
        container: &str,
        session: &str,
        since: Option<u64>,
        max_bytes: Option<u64>,
        tail_lines: Option<u32>,
    ) -> Result<SessionReadResult, ConnectorError> {
        let mut full_args = vec!["session-read".to_string(), container.to_string(), session.to_string()];
        if let Some(s) = since {
            full_args.push("--since".to_string());
            full_args.push(s.to_string());
        }
        if let Some(m) = max_bytes {
            full_args.push("--max-bytes".to_string());
            full_args.push(m.to_string());
        }
        if let Some(t) = tail_lines {
            full_args.push("--tail-lines".to_string());
            full_args.push(t.to_string());
        }
        full_args.push("--format".to_string());
        full_args.push("json".to_string());
        let refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
        let out = self.run(&refs, Duration::from_secs(10)).await?;

        #[derive(serde::Deserialize)]
        struct Raw {
            text: String,
            next_offset: u64,
        }
        let raw: Raw = serde_json::from_str(&out.stdout)
            .map_err(|e| ConnectorError::Other(format!("malformed session-read output: {e}")))?;
        Ok(SessionReadResult {
            text: raw.text,
            next_offset: raw.next_offset,
        })
    }

    async fn repo_seed(&self, container: &str, args: RepoSeedArgs) -> Result<(), ConnectorError> {
        let timeout = Duration::from_millis(args.timeout_ms.max(1));
        self.run(
            &[
                "repo-seed",
                container,
                "--host-path",
                &args.host_path,
                "--dest",
                &args.dest,
                "--base-ref",
                &args.base_ref,
                "--branch",
                &args.branch,
                if args.clean { "--clean" } else { "--no-clean" },
            ],
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn repo_export(
        &self,
        container: &str,
        args: RepoExportArgs,
    ) -> Result<RepoExportResult, ConnectorError> {
        let mut full_args = vec![
            "repo-export".to_string(),
            container.to_string(),
            "--repo-path".to_string(),
            args.repo_path_in_container.clone(),
            "--out-dir".to_string(),
            args.out_dir.clone(),
            "--format".to_string(),
            "bundle".to_string(),
        ];
        if let Some(base) = &args.base {
            full_args.push("--base".to_string());
            full_args.push(base.clone());
        }
        let refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
        let out = self.run(&refs, Duration::from_secs(120)).await?;
        let exported_path = out.stdout.trim().to_string();
        if exported_path.is_empty() {
            warn!(component = "container_adapter", event = "container.repo_export_empty_path", container);
            return Err(ConnectorError::Other("repo-export produced no path".to_string()));
        }
        Ok(RepoExportResult { exported_path })
    }

    async fn repo_head_sha(&self, container: &str) -> Result<String, ConnectorError> {
        let out = self
            .run(&["repo-head-sha", container], Duration::from_secs(10))
            .await?;
        Ok(out.stdout.trim().to_string())
    }

    async fn repo_set_base_sha(&self, container: &str, sha: &str) -> Result<(), ConnectorError> {
        self.run(&["repo-set-base-sha", container, sha], Duration::from_secs(10))
            .await?;
        Ok(())
    }

    async fn base_set(&self, container: &str, timeout_ms: Option<u64>) -> Result<(), ConnectorError> {
        let timeout = timeout_ms.map(Duration::from_millis).unwrap_or(Duration::from_secs(30));
        self.run(&["base-set", container], timeout).await?;
        Ok(())
    }

    async fn remove(&self, container: &str, keep_volume: bool) -> Result<(), ConnectorError> {
        let args: &[&str] = if keep_volume {
            &["remove", container, "--keep-volume"]
        } else {
            &["remove", container]
        };
        self.run(args, Duration::from_secs(30)).await?;
        Ok(())
    }

    async fn start(&self, container: &str) -> Result<(), ConnectorError> {
        self.run(&["start", container], DEFAULT_NODE_CLI_TIMEOUT).await?;
        Ok(())
    }

    async fn stop(&self, container: &str) -> Result<(), ConnectorError> {
        self.run(&["stop", container], Duration::from_secs(30)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_with_configured_binary() {
        let adapter = DvmContainerAdapter::new("dvm");
        assert_eq!(adapter.bin, "dvm");
    }
}
