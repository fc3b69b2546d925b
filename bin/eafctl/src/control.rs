//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "binary"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Session control subcommands backed by the demo REST endpoints."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use anyhow::{anyhow, bail, Context, Result};
use clap::Subcommand;
use eaf_sim::parse_seed;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use url::Url;

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    #[command(about = "Show the session snapshot")]
    Status { session: String },
    #[command(about = "Start ticking, optionally reseeding first")]
    Start {
        session: String,
        #[arg(long, value_parser = parse_seed)]
        seed: Option<u64>,
    },
    #[command(about = "Stop ticking")]
    Stop { session: String },
    #[command(about = "Reset the generator to a fresh heat")]
    Reset {
        session: String,
        #[arg(long, value_parser = parse_seed)]
        seed: Option<u64>,
    },
    #[command(about = "Arm a catalog scenario")]
    Inject {
        session: String,
        scenario: String,
        #[arg(long)]
        trigger_at: Option<u64>,
    },
    #[command(about = "Drop the pending scenario")]
    Clear { session: String },
    #[command(about = "List the scenario catalog")]
    Catalog,
}

impl SessionCommand {
    fn request(&self) -> (Method, String, Option<Value>) {
        match self {
            SessionCommand::Status { session } => {
                (Method::GET, format!("demo/{session}/status"), None)
            }
            SessionCommand::Start { session, seed } => (
                Method::POST,
                format!("demo/{session}/start"),
                Some(json!({ "seed": seed })),
            ),
            SessionCommand::Stop { session } => {
                (Method::POST, format!("demo/{session}/stop"), None)
            }
            SessionCommand::Reset { session, seed } => (
                Method::POST,
                format!("demo/{session}/reset"),
                Some(json!({ "seed": seed })),
            ),
            SessionCommand::Inject {
                session,
                scenario,
                trigger_at,
            } => (
                Method::POST,
                format!("demo/{session}/scenario"),
                Some(json!({ "id": scenario, "triggerAtSimSecond": trigger_at })),
            ),
            SessionCommand::Clear { session } => {
                (Method::DELETE, format!("demo/{session}/scenario"), None)
            }
            SessionCommand::Catalog => (Method::GET, "demo/scenarios".to_owned(), None),
        }
    }
}

fn control_url(page_url: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(page_url)
        .with_context(|| format!("invalid page url {page_url}"))?
        .join("/")?
        .join(path)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        other => bail!("unsupported scheme {other}"),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot rewrite scheme of {url}"))?;
    Ok(url)
}

pub async fn run(page_url: &str, command: SessionCommand) -> Result<()> {
    let (method, path, body) = command.request();
    let url = control_url(page_url, &path)?;
    let mut request = Client::new().request(method, url.clone());
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        println!("{{}}");
        return Ok(());
    }
    let payload: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request failed");
        bail!("{status}: {message}");
    }
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
