use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "balancer-ctl")]
#[command(about = "Inspect a running http-balancer through its admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "BALANCER_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pool summary: strategy and live backend count
    Status,
    /// Per-backend liveness, in-flight requests and latency
    Backends,
}

impl Commands {
    fn path(&self) -> &'static str {
        match self {
            Commands::Status => "/admin/status",
            Commands::Backends => "/admin/backends",
        }
    }
}

#[derive(Debug, Error)]
enum CtlError {
    #[error("admin API returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid admin key: {0}")]
    Key(#[from] InvalidHeaderValue),
}

/// GET an admin endpoint and decode its JSON body. Non-2xx answers are errors.
async fn fetch(client: &reqwest::Client, base: &str, key: &str, path: &str) -> Result<Value, CtlError> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let res = client
        .get(format!("{}{}", base.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(CtlError::Status { status, body });
    }
    Ok(res.json().await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let json = fetch(&client, &cli.url, &cli.key, cli.command.path()).await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
