//! `drone-hubctl` — a thin admin client for a running Drone Hub.
//!
//! Issues REST calls against the hub's `/api` surface and can attach to a
//! drone's terminal WebSocket bridge for local debugging.

use std::time::Duration;

use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use console::style;
use drone_hub_protocol::api::{CreateDroneRequest, CreateDroneResponse, PromptRequest, PromptResponse};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[derive(Parser)]
#[command(name = "drone-hubctl", about = "Admin client for Drone Hub")]
struct Cli {
    /// Base URL of a running hub, e.g. http://127.0.0.1:4100
    #[arg(long, env = "DRONE_HUB_URL", default_value = "http://127.0.0.1:4100")]
    url: String,

    /// Bearer token. Falls back to `DRONE_HUB_TOKEN`.
    #[arg(long, env = "DRONE_HUB_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List drones (live and pending).
    List,
    /// Create a new drone.
    Create {
        name: String,
        #[arg(long)]
        repo_path: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    /// Send a prompt to a chat.
    Prompt {
        drone: String,
        chat: String,
        prompt: String,
    },
    /// Print a chat transcript.
    Transcript {
        drone: String,
        chat: String,
        #[arg(long, default_value = "all")]
        turn: String,
    },
    /// Attach to a drone's terminal over the WebSocket bridge.
    Terminal { drone: String, session: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = HubClient::new(cli.url.clone(), cli.token.clone());

    match cli.command {
        Command::List => cmd_list(&client).await,
        Command::Create {
            name,
            repo_path,
            group,
        } => cmd_create(&client, name, repo_path, group).await,
        Command::Prompt {
            drone,
            chat,
            prompt,
        } => cmd_prompt(&client, &drone, &chat, &prompt).await,
        Command::Transcript { drone, chat, turn } => cmd_transcript(&client, &drone, &chat, &turn).await,
        Command::Terminal { drone, session } => cmd_terminal(&cli.url, cli.token.as_deref(), &drone, &session).await,
    }
}

struct HubClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HubClient {
    fn new(base_url: String, token: Option<String>) -> Self {
        HubClient {
            base_url,
            token,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("client"),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }
}

async fn cmd_list(client: &HubClient) -> anyhow::Result<()> {
    let resp: Value = client
        .request(reqwest::Method::GET, "/api/drones")
        .send()
        .await?
        .json()
        .await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["id", "name", "group", "phase/status"]);

    if let Some(drones) = resp.get("drones").and_then(Value::as_array) {
        for d in drones {
            table.add_row(vec![
                d.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
                d.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                d.get("group").and_then(Value::as_str).unwrap_or("Ungrouped").to_string(),
                d.get("phase")
                    .and_then(Value::as_str)
                    .unwrap_or("ready")
                    .to_string(),
            ]);
        }
    }

    println!("{table}");
    Ok(())
}

async fn cmd_create(
    client: &HubClient,
    name: String,
    repo_path: Option<String>,
    group: Option<String>,
) -> anyhow::Result<()> {
    let body = CreateDroneRequest {
        name,
        group,
        repo_path,
        container_port: None,
        cwd: None,
        mkdir: None,
        no_build: None,
        clone_from: None,
        clone_chats: None,
        seed: None,
    };
    let resp: CreateDroneResponse = client
        .request(reqwest::Method::POST, "/api/drones")
        .json(&body)
        .send()
        .await?
        .json()
        .await?;
    println!("{} id={} phase={:?}", style("created").green(), resp.id, resp.phase);
    Ok(())
}

async fn cmd_prompt(client: &HubClient, drone: &str, chat: &str, prompt: &str) -> anyhow::Result<()> {
    let body = PromptRequest {
        prompt: prompt.to_string(),
        prompt_id: None,
        attachments: None,
        cwd: None,
    };
    let path = format!(
        "/api/drones/{}/chats/{}/prompt",
        urlencoding::encode(drone),
        urlencoding::encode(chat)
    );
    let resp: PromptResponse = client
        .request(reqwest::Method::POST, &path)
        .json(&body)
        .send()
        .await?
        .json()
        .await?;
    println!("{} id={} state={:?}", style("enqueued").green(), resp.id, resp.state);
    Ok(())
}

async fn cmd_transcript(client: &HubClient, drone: &str, chat: &str, turn: &str) -> anyhow::Result<()> {
    let path = format!(
        "/api/drones/{}/chats/{}/transcript?turn={}",
        urlencoding::encode(drone),
        urlencoding::encode(chat),
        urlencoding::encode(turn)
    );
    let resp: Value = client.request(reqwest::Method::GET, &path).send().await?.json().await?;
    if let Some(turns) = resp.get("turns").and_then(Value::as_array) {
        for t in turns {
            let prompt = t.get("prompt").and_then(Value::as_str).unwrap_or("");
            let output = t.get("output").and_then(Value::as_str).unwrap_or("");
            println!("{}\n{}\n{}\n", style("›").cyan(), prompt, output);
        }
    }
    Ok(())
}

async fn cmd_terminal(base_url: &str, token: Option<&str>, drone: &str, session: &str) -> anyhow::Result<()> {
    let ws_base = base_url.replacen("http", "ws", 1);
    let mut url = format!(
        "{}/api/drones/{}/terminal/{}/stream?since=0",
        ws_base,
        urlencoding::encode(drone),
        urlencoding::encode(session)
    );
    if let Some(token) = token {
        url.push_str(&format!("&token={}", urlencoding::encode(token)));
    }

    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg? {
            WsMessage::Text(text) => {
                if let Ok(frame) = serde_json::from_str::<Value>(&text) {
                    if let Some(out) = frame.get("text").and_then(Value::as_str) {
                        print!("{out}");
                    }
                }
            }
            WsMessage::Ping(data) => {
                write.send(WsMessage::Pong(data)).await?;
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}
