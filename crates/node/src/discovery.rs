//! Broker discovery, edge side.
//!
//! One-shot handshake at boot: listen on a fixed port, accept exactly
//! one connection from the hub, read the broker address it sends,
//! answer `ACK`, and hand the address to the caller.  The listener is
//! dropped afterwards; there is no re-listen within a run.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::info;

/// Block until the hub announces the broker address on `port`.
pub async fn wait_for_broker(port: u16) -> Result<String> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind discovery port {port}"))?;
    info!(port, "waiting for the hub to announce the broker address");
    accept_announcement(listener).await
}

/// Accept one announcement on an already-bound listener.
async fn accept_announcement(listener: TcpListener) -> Result<String> {
    let (mut stream, peer) = listener
        .accept()
        .await
        .context("discovery accept failed")?;

    let mut buf = [0u8; 256];
    let n = stream
        .read(&mut buf)
        .await
        .context("failed to read broker address")?;
    if n == 0 {
        bail!("hub closed the connection before sending an address");
    }

    let addr = std::str::from_utf8(&buf[..n])
        .context("broker address is not valid UTF-8")?
        .trim()
        .to_string();
    if addr.is_empty() {
        bail!("hub sent an empty broker address");
    }

    stream
        .write_all(b"ACK")
        .await
        .context("failed to acknowledge broker address")?;

    info!(%peer, broker = %addr, "broker address received");
    Ok(addr)
}

// ===========================================================================
// Tests
// ===========================================================================
