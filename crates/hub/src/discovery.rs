//! Broker discovery, hub side.
//!
//! Pushes the broker address to the node's discovery port and waits for
//! the literal `ACK`.  Attempts time out after a fixed 10 s; failures
//! retry after a fixed 5 s delay, indefinitely — no backoff, no cap.
//! The node only listens once per boot, so one acknowledged delivery
//! ends the loop.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Announce `broker_addr` to the node at `node_addr` (host:port),
/// retrying until acknowledged.  Returns the number of attempts taken.
pub async fn announce_broker(node_addr: String, broker_addr: String) -> usize {
    info!(node = %node_addr, broker = %broker_addr, "announcing broker address to node");
    retry_forever(
        || attempt_announce(&node_addr, &broker_addr),
        RETRY_DELAY,
    )
    .await
}

/// Drive `attempt` until it succeeds, sleeping `delay` between
/// failures.  Factored out so tests can count attempts and spacing.
pub(crate) async fn retry_forever<F, Fut>(mut attempt: F, delay: Duration) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(()) => {
                info!(attempts, "broker address acknowledged");
                return attempts;
            }
            Err(e) => {
                warn!(attempt = attempts, "announce failed: {e:#}. retrying in {delay:?}");
                sleep(delay).await;
            }
        }
    }
}

/// One handshake attempt: connect, send the address, expect `ACK`.
async fn attempt_announce(node_addr: &str, broker_addr: &str) -> Result<()> {
    let mut stream = timeout(ATTEMPT_TIMEOUT, TcpStream::connect(node_addr))
        .await
        .context("connect timed out")?
        .context("connect failed")?;

    timeout(ATTEMPT_TIMEOUT, async {
        stream
            .write_all(broker_addr.as_bytes())
            .await
            .context("failed to send broker address")?;

        let mut ack = [0u8; 3];
        stream
            .read_exact(&mut ack)
            .await
            .context("failed to read acknowledgement")?;
        if &ack != b"ACK" {
            bail!("unexpected acknowledgement {:?}", ack);
        }
        Ok(())
    })
    .await
    .context("handshake timed out")?
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    // -- retry_forever -----------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_means_three_attempts_spaced_apart() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stamps = Arc::new(std::sync::Mutex::new(Vec::<Instant>::new()));

        let attempts = {
            let calls = Arc::clone(&calls);
            let stamps = Arc::clone(&stamps);
            retry_forever(
                move || {
                    let calls = Arc::clone(&calls);
                    let stamps = Arc::clone(&stamps);
                    async move {
                        stamps.lock().unwrap().push(Instant::now());
                        // First two attempts time out, the third is acked.
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            anyhow::bail!("simulated connect timeout")
                        }
                        Ok(())
                    }
                },
                Duration::from_secs(5),
            )
            .await
        };

        assert_eq!(attempts, 3);

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_secs(5), "attempts only {gap:?} apart");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_takes_one_attempt() {
        let attempts = retry_forever(|| async { Ok(()) }, Duration::from_secs(5)).await;
        assert_eq!(attempts, 1);
    }

    // -- attempt_announce ---------------------------------------------------

    #[tokio::test]
    async fn announce_succeeds_against_an_acking_node() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"192.168.1.10");
            stream.write_all(b"ACK").await.unwrap();
        });

        attempt_announce(&addr.to_string(), "192.168.1.10")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn announce_fails_on_wrong_acknowledgement() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf).await;
            stream.write_all(b"NAK").await.unwrap();
        });

        assert!(attempt_announce(&addr.to_string(), "192.168.1.10")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn announce_fails_when_nothing_listens() {
        assert!(attempt_announce("127.0.0.1:1", "192.168.1.10").await.is_err());
    }
}
