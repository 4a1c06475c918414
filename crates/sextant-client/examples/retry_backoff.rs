//! Connect to an MCP server with caller-side retry.
//!
//! The engine itself never retries; deciding whether a failure is
//! worth another attempt belongs to the caller. This example wraps
//! connect + initialize in exponential backoff with ±25% jitter.
//!
//! Run with: `cargo run -p sextant-client --example retry_backoff -- 127.0.0.1:8811`

use anyhow::{Context, Result, bail};
use rand::Rng;
use sextant_client::{Client, ClientError};
use sextant_transport::TcpTransport;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const MAX_RETRIES: u32 = 4;
const INITIAL_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 10_000;
const BACKOFF_FACTOR: f64 = 2.0;

/// Transient failures are worth another attempt; protocol-level
/// refusals are not.
fn is_retryable(error: &ClientError) -> bool {
    matches!(
        error,
        ClientError::Connection(_) | ClientError::Timeout { .. } | ClientError::NotConnected
    )
}

/// `INITIAL_DELAY_MS * BACKOFF_FACTOR^attempt` with ±25% jitter,
/// clamped to `MAX_DELAY_MS`.
fn calculate_delay(attempt: u32) -> u64 {
    let base = INITIAL_DELAY_MS as f64 * BACKOFF_FACTOR.powi(attempt as i32);
    let clamped = base.min(MAX_DELAY_MS as f64);
    let jitter_factor = rand::rng().random_range(0.75..=1.25);
    ((clamped * jitter_factor) as u64).min(MAX_DELAY_MS)
}

async fn connect_with_retry(host: &str, port: u16) -> Result<Client> {
    for attempt in 0..=MAX_RETRIES {
        let client = Client::new(TcpTransport::new(host, port));
        let outcome = async {
            client.connect().await?;
            client.initialize().await
        }
        .await;

        match outcome {
            Ok(server) => {
                tracing::info!(
                    "connected to {} {} (attempt {}/{})",
                    server.name,
                    server.version,
                    attempt + 1,
                    MAX_RETRIES + 1
                );
                return Ok(client);
            }
            Err(e) if is_retryable(&e) && attempt < MAX_RETRIES => {
                let delay = calculate_delay(attempt);
                tracing::warn!(
                    "attempt {}/{} failed: {e}. retrying in {delay}ms",
                    attempt + 1,
                    MAX_RETRIES + 1,
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e).context("giving up"),
        }
    }
    unreachable!("loop returns on the final attempt")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8811".to_string());
    let Some((host, port)) = target.rsplit_once(':') else {
        bail!("expected host:port, got {target}");
    };
    let port: u16 = port.parse().context("port must be a number")?;

    let client = connect_with_retry(host, port).await?;
    for tool in client.list_tools().await? {
        println!("{}", tool.name);
    }
    client.disconnect().await?;
    Ok(())
}
