//! # Request Subcommand
//!
//! Sends one request through the authenticated client and prints the body.

use anyhow::Context;
use clap::Args;
use paygate_client::{ApiClient, RequestOptions};
use paygate_client::Method;

/// Arguments for the request subcommand.
#[derive(Args, Debug)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE).
    #[arg(value_parser = parse_method)]
    pub method: Method,

    /// Path relative to the API base URL, e.g. `/transactions?page=2`.
    pub path: String,

    /// JSON request body.
    #[arg(long)]
    pub data: Option<String>,

    /// Send without credentials.
    #[arg(long)]
    pub skip_auth: bool,
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw}"))
}

pub async fn run(client: &ApiClient, args: RequestArgs) -> anyhow::Result<()> {
    let body = args
        .data
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--data is not valid JSON")?;

    let mut options = RequestOptions::new();
    if args.skip_auth {
        options = options.skip_auth();
    }

    let resp = client.send(args.method, &args.path, body, options).await?;
    tracing::debug!(status = resp.status.as_u16(), "request completed");
    println!("{}", serde_json::to_string_pretty(&resp.body)?);
    Ok(())
}
