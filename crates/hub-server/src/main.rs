//! Drone Hub Server
//!
//! Orchestration daemon for disposable, containerized coding-agent drones.
//! Exposes the HTTP/WS API consumed by the desktop UI and `drone-hubctl`.

mod agents;
mod app_state;
mod archive;
mod auth;
mod chat_registry;
mod cmd_init;
mod cmd_install_service;
mod cmd_status;
mod container_adapter;
mod cors;
mod crypto;
mod daemon_client;
mod error;
mod git;
mod handlers;
mod logging;
mod lookup;
mod oplock;
pub(crate) mod paths;
mod prompt_pipeline;
mod provisioning;
mod reconciliation;
mod registry;
mod repo_pull;
mod settings;
mod terminal_bridge;
mod time;
mod transitions;
mod ttl_cache;
mod worker_pool;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::{delete, get, post};
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app_state::{new_container_adapter, AppState, SharedState};
use crate::registry::RegistryStore;
use crate::settings::HubConfig;

pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:4000";

#[derive(Parser, Debug)]
#[command(name = "drone-hub", about = "Drone Hub server — orchestration daemon for agent drones", version = VERSION)]
struct Cli {
    /// Data directory (default: ~/.drone-hub)
    #[arg(long, global = true, env = "DRONE_HUB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the hub (default when no subcommand is given)
    Serve {
        #[arg(long, default_value = DEFAULT_BIND, env = "DRONE_HUB_BIND_ADDR")]
        bind: SocketAddr,

        /// Bearer token requests must present; defaults to the contents of
        /// `<data-dir>/auth-token`, generating one if it doesn't exist yet
        #[arg(long, env = "DRONE_HUB_AUTH_TOKEN")]
        token: Option<String>,
    },

    /// First-run setup: create the data directory, registry file, and token
    Init,

    /// Report whether the hub is running (PID file + /health probe)
    Status,

    /// Print the bearer token, generating one if it doesn't exist
    Token {
        /// Overwrite the existing token with a freshly generated one
        #[arg(long)]
        regenerate: bool,
    },

    /// Install a systemd unit (Linux) or launchd plist (macOS)
    InstallService {
        #[arg(long, default_value = DEFAULT_BIND)]
        bind: SocketAddr,

        #[arg(long)]
        enable: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = paths::init_data_dir(cli.data_dir.as_deref());

    match &cli.command {
        Some(Command::Init) => return cmd_init::run(&data_dir),
        Some(Command::Status) => return cmd_status::run(&data_dir),
        Some(Command::Token { regenerate }) => return cmd_status::print_token(&data_dir, *regenerate),
        Some(Command::InstallService { bind, enable }) => {
            return cmd_install_service::run(&data_dir, *bind, *enable)
        }
        _ => {}
    }

    let (bind_addr, token) = match cli.command {
        Some(Command::Serve { bind, token }) => (bind, token),
        _ => (DEFAULT_BIND.parse().unwrap(), None),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main(bind_addr, token, &data_dir))
}

async fn async_main(bind_addr: SocketAddr, token: Option<String>, data_dir: &std::path::Path) -> anyhow::Result<()> {
    paths::ensure_dirs()?;
    crypto::ensure_key();

    let logging = logging::init_logging(&paths::log_dir())?;
    let run_id = logging.run_id.clone();
    let _log_guard = logging.guard;
    let root_span = tracing::info_span!("drone_hub", service = "drone-hub", run_id = %run_id);
    let _root_span_guard = root_span.enter();

    let auth_token = resolve_auth_token(token);

    info!(
        component = "server",
        event = "server.starting",
        run_id = %run_id,
        version = VERSION,
        pid = std::process::id(),
        data_dir = %data_dir.display(),
        bind_address = %bind_addr,
        "starting drone-hub"
    );

    let config = HubConfig::resolve(bind_addr, auth_token.clone());
    let registry = RegistryStore::open()?;
    let container = new_container_adapter(&config.dvm_bin);
    let provision_concurrency = config.provision_concurrency;
    let reconcile_concurrency = config.reconcile_concurrency;
    let pump_concurrency = config.pending_prompt_pump_concurrency;

    // Worker pool handlers close over `state` itself, which doesn't exist
    // until `AppState` is built; `Arc::new_cyclic` hands each handler a
    // `Weak` it upgrades per-job, so a job that outlives shutdown just no-ops
    // instead of keeping the server alive.
    let state: SharedState = std::sync::Arc::new_cyclic(|weak| {
        let provisioning = {
            let weak = weak.clone();
            worker_pool::WorkerPool::spawn(provision_concurrency, move |id: String| {
                let weak = weak.clone();
                async move {
                    if let Some(state) = weak.upgrade() {
                        provisioning::provision_drone_from_pending(state, id).await;
                    }
                }
            })
        };
        let reconcile = {
            let weak = weak.clone();
            worker_pool::WorkerPool::spawn(reconcile_concurrency, move |key: (String, String)| {
                let weak = weak.clone();
                async move {
                    if let Some(state) = weak.upgrade() {
                        reconciliation::reconcile_chat(state, key).await;
                    }
                }
            })
        };
        let pending_pump = {
            let weak = weak.clone();
            worker_pool::WorkerPool::spawn(pump_concurrency, move |(drone_id, chat_name): (String, String)| {
                let weak = weak.clone();
                async move {
                    if let Some(state) = weak.upgrade() {
                        prompt_pipeline::pump_pending_prompts(&state, &drone_id, &chat_name).await;
                    }
                }
            })
        };

        AppState {
            registry,
            oplock: oplock::DroneOpLock::new(),
            container,
            config,
            provisioning,
            reconcile,
            pending_pump,
            pull_preview_cache: ttl_cache::TtlCache::new(app_state::PULL_PREVIEW_TTL),
            model_cache: ttl_cache::TtlCache::new(app_state::MODEL_DISCOVERY_TTL),
        }
    });

    provisioning::enqueue_provisioning_for_all_pending(&state).await;
    archive::spawn_sweeper(state.clone());
    spawn_pull_conflict_sweeper(state.clone());
    spawn_reconcile_sweeper(state.clone());

    let app = build_router(state.clone(), &auth_token);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(component = "server", event = "server.listening", bind_address = %bind_addr, "listening for connections");

    write_pid_file();

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    remove_pid_file();
    Ok(())
}

/// `DRONE_HUB_BIND_ADDR`-style layering for the auth token: CLI flag > env
/// (handled by clap) > `<data-dir>/auth-token` file, generating one on first
/// run so `serve` always has a real token even with zero configuration.
fn resolve_auth_token(explicit: Option<String>) -> String {
    if let Some(token) = explicit {
        return token;
    }
    let path = paths::token_file_path();
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim().to_string();
        if !trimmed.is_empty() {
            return trimmed;
        }
    }
    let token = uuid::Uuid::new_v4().to_string();
    let _ = std::fs::write(&path, &token);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
    }
    token
}

fn build_router(state: SharedState, auth_token: &str) -> Router {
    use handlers::{archive, chats, drones, fs, groups, preview, repo, settings, terminal};

    let api = Router::new()
        .route("/drones", get(drones::list).post(drones::create))
        .route("/drones/batch", post(drones::batch_create))
        .route("/drones/group-set", post(drones::group_set))
        .route("/drones/{id}/rename", post(drones::rename))
        .route("/drones/{id}/hub/error/clear", post(drones::clear_hub_error))
        .route("/drones/{id}/archive", post(drones::archive))
        .route("/drones/{id}", delete(drones::delete))
        .route("/drones/{id}/base-image", post(drones::base_image))
        .route("/drones/{id}/fs/list", get(fs::list))
        .route("/drones/{id}/fs/file", get(fs::get_file).post(fs::put_file))
        .route("/drones/{id}/fs/thumb", get(fs::thumb))
        .route("/drones/{id}/preview/{container_port}/{*rest}", axum::routing::any(preview::proxy))
        .route("/drones/{id}/repo/changes", get(repo::changes))
        .route("/drones/{id}/repo/diff", get(repo::diff))
        .route("/drones/{id}/repo/pull/changes", get(repo::pull_changes))
        .route("/drones/{id}/repo/pull/diff", get(repo::pull_diff))
        .route("/drones/{id}/repo/reseed", post(repo::reseed))
        .route("/drones/{id}/repo/pull", post(repo::pull))
        .route("/drones/{id}/chats", get(chats::list))
        .route("/drones/{id}/chats/{chat}", get(chats::get))
        .route("/drones/{id}/chats/{chat}/config", post(chats::config))
        .route("/drones/{id}/chats/{chat}/prompt", post(chats::prompt))
        .route("/drones/{id}/chats/{chat}/pending", get(chats::pending))
        .route("/drones/{id}/chats/{chat}/pending/{prompt_id}/unstick", post(chats::unstick))
        .route("/drones/{id}/chats/{chat}/transcript", get(chats::transcript))
        .route("/drones/{id}/chats/{chat}/output", get(chats::output))
        .route("/drones/{id}/chats/{chat}/models", get(chats::models))
        .route("/drones/{id}/terminal/open", post(terminal::open))
        .route("/drones/{id}/terminal/{session}/output", get(terminal::output))
        .route("/drones/{id}/terminal/{session}/input", post(terminal::input))
        .route("/drones/{id}/terminal/{session}/stream", get(terminal_bridge::stream))
        .route("/archived", get(archive::list))
        .route("/archived/{id}/restore", post(archive::restore))
        .route("/archived/{id}", delete(archive::delete))
        .route("/groups", get(groups::list).post(groups::create))
        .route("/groups/{name}/rename", post(groups::rename))
        .route("/groups/{name}", delete(groups::delete))
        .route("/settings", get(settings::get))
        .route("/settings/openai", post(settings::set_openai))
        .route("/settings/gemini", post(settings::set_gemini))
        .route("/settings/llm", post(settings::set_llm))
        .route("/settings/delete-action", post(settings::set_delete_action))
        .route("/settings/hub/logs", get(settings::hub_logs));

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .with_state(state.clone());

    app = app.layer(axum::middleware::from_fn_with_state(auth_token.to_string(), auth::auth_middleware));
    app.layer(TraceLayer::new_for_http()).layer(cors::layer(state.config.cors_allowed_origins.clone()))
}

/// `clear_resolved_conflicts` (§4.9) has no natural caller in the request
/// path — a host-side git push can resolve a conflict the hub recorded
/// without the hub ever being told, so this ticks on a timer instead.
fn spawn_pull_conflict_sweeper(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            repo_pull::clear_resolved_conflicts(&state).await;
        }
    });
}

/// Drives the Reconciliation Pipeline (§4.7, §2's "periodic Reconciler
/// queries `prompt/get` for unresolved ids"): a prompt that's been submitted
/// to the daemon (`Sending`/`Sent`) has no other trigger to get polled and
/// turned into a transcript `Turn` — ticks on a timer the same way
/// `spawn_pull_conflict_sweeper` does for pull-conflict clearing.
fn spawn_reconcile_sweeper(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(2));
        loop {
            interval.tick().await;
            reconciliation::enqueue_reconcile_for_in_flight_prompts(&state).await;
        }
    });
}

fn write_pid_file() {
    let path = paths::pid_file_path();
    if let Err(e) = std::fs::write(&path, std::process::id().to_string()) {
        warn!(component = "server", event = "server.pid_file.write_error", path = %path.display(), error = %e);
    }
}

fn remove_pid_file() {
    let _ = std::fs::remove_file(paths::pid_file_path());
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(component = "server", event = "server.shutdown", "shutdown signal received");
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
}

async fn health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok", "version": VERSION}))
}
