//! Manual smoke client for a running `server_ais`.
//!
//! Opens one stream through the proxy, polls `getStatus` on an interval and
//! prints the message rate, then disconnects on Ctrl-C.

use anyhow::{bail, Result};
use clap::Parser;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the proxy
    #[clap(long, default_value = "http://127.0.0.1:9003")]
    server: String,

    /// AIS Stream API key
    #[clap(long, env = "AISSTREAM_API_KEY")]
    api_key: String,

    /// Poll interval in seconds
    #[clap(short, long, default_value_t = 2)]
    interval_seconds: u64,

    /// Bounding box as lat1,lng1,lat2,lng2
    #[clap(long, default_value = "25.6,-80.2,25.8,-79.9")]
    bbox: String,
}

fn parse_bbox(raw: &str) -> Result<Value> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    if parts.len() != 4 {
        bail!("expected 4 comma separated numbers, got {}", parts.len());
    }
    Ok(json!([[[parts[0], parts[1]], [parts[2], parts[3]]]]))
}

async fn call(client: &reqwest::Client, endpoint: &str, body: Value) -> Result<Value> {
    let response = client.post(endpoint).json(&body).send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    if !status.is_success() {
        bail!("{} -> {}: {}", endpoint, status, body);
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();
    let endpoint = format!("{}/api/maritime/ais-stream", args.server.trim_end_matches('/'));

    let reply = call(
        &client,
        &endpoint,
        json!({
            "action": "connect",
            "aisApiKey": args.api_key,
            "subscriptionConfig": { "boundingBoxes": parse_bbox(&args.bbox)? },
        }),
    )
    .await?;
    let id = reply["connectionId"].as_str().unwrap_or_default().to_string();
    println!("Connection {} initiated. Press Ctrl+C to stop.", id);

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_seconds.max(1)));
    let mut last_count = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = call(&client, &endpoint, json!({ "action": "getStatus", "connectionId": id })).await?;
                let connection = &status["connection"];
                let count = connection["messageCount"].as_u64().unwrap_or(0);
                println!(
                    "status={} messages={} (+{}) last={}",
                    connection["status"].as_str().unwrap_or("?"),
                    count,
                    count.saturating_sub(last_count),
                    connection["lastMessage"].as_str().unwrap_or("-"),
                );
                if let Some(error) = connection["error"].as_str() {
                    println!("error: {}", error);
                }
                last_count = count;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    call(&client, &endpoint, json!({ "action": "disconnect", "connectionId": id })).await?;
    println!("Disconnected {}.", id);
    Ok(())
}
