//! Connection Lifecycle: accept TCP and Unix-socket peers, run one read
//! loop and one write loop per connection, and report connect/disconnect/
//! frame events to the [`Router`](crate::router::Router).
//!
//! Mirrors the teacher's `forwarder::local_fanout::FanoutServer::run`
//! pattern: one `tokio::spawn` per accepted connection, a bounded `mpsc`
//! channel carrying outbound frames into the write half.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, FramedRead};
use tracing::{debug, error, info, warn};

use broker_wire::{decode_message, Message, RawFrameCodec, WireCodec};

use crate::config::{ListenConfig, ListenKind};
use crate::error::BrokerError;
use crate::router::RouterInbound;

/// Identifies one live connection for the lifetime of the process. Distinct
/// from the channel name a peer may or may not register — a connection
/// exists from `accept` to socket close regardless of registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        ConnectionId(id)
    }

    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A frame queued for delivery to a peer's write half. `Raw` carries bytes
/// exactly as received from some other peer (forwarded `req`/`res`/`pub`
/// traffic); `Message` is encoded fresh by the write loop for anything the
/// broker itself originates.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Raw(Bytes),
    Message(Message),
}

const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Binds the configured listener and runs the accept loop until `shutdown`
/// resolves. Each accepted connection gets its own read/write task pair.
pub async fn serve(
    listen: &ListenConfig,
    router_tx: mpsc::Sender<RouterInbound>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<(), BrokerError> {
    match listen.kind {
        ListenKind::Tcp => {
            let listener = TcpListener::bind(&listen.address).await?;
            info!(address = %listen.address, "listening on tcp");
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, _addr) = accepted?;
                        debug!("accepted tcp connection");
                        spawn_connection(stream, router_tx.clone());
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("tcp listener shutting down");
                            return Ok(());
                        }
                    }
                }
            }
        }
        ListenKind::Unix => {
            let path = Path::new(&listen.address);
            let listener = match UnixListener::bind(path) {
                Ok(listener) => listener,
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    // Stale socket file from a prior, uncleanly-stopped run.
                    std::fs::remove_file(path)?;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    UnixListener::bind(path)?
                }
                Err(e) => return Err(e.into()),
            };
            info!(address = %listen.address, "listening on unix socket");
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, _addr) = accepted?;
                        debug!("accepted unix connection");
                        spawn_connection(stream, router_tx.clone());
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("unix listener shutting down");
                            let _ = std::fs::remove_file(path);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn spawn_connection<S>(stream: S, router_tx: mpsc::Sender<RouterInbound>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let connection_id = ConnectionId::next();
    let (read_half, write_half) = tokio::io::split(stream);
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

    tokio::spawn(write_loop(connection_id, write_half, outbound_rx));
    tokio::spawn(read_loop(connection_id, read_half, router_tx, outbound_tx));
}

async fn read_loop<R>(
    connection_id: ConnectionId,
    read_half: R,
    router_tx: mpsc::Sender<RouterInbound>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
) where
    R: AsyncRead + Unpin,
{
    use futures_util::StreamExt;

    if router_tx
        .send(RouterInbound::Connected { connection_id, sender: outbound_tx })
        .await
        .is_err()
    {
        return;
    }

    let mut frames = FramedRead::new(read_half, RawFrameCodec);
    loop {
        match frames.next().await {
            Some(Ok(raw)) => match decode_message(&raw) {
                Ok(message) => {
                    if router_tx.send(RouterInbound::Frame { connection_id, raw, message }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(?connection_id, error = %e, "malformed frame; closing peer");
                    break;
                }
            },
            Some(Err(e)) => {
                warn!(?connection_id, error = %e, "framing error; closing peer");
                break;
            }
            None => {
                debug!(?connection_id, "peer closed connection");
                break;
            }
        }
    }

    let _ = router_tx.send(RouterInbound::Disconnected(connection_id)).await;
}

async fn write_loop<W>(
    connection_id: ConnectionId,
    mut write_half: W,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
) where
    W: AsyncWrite + Unpin,
{
    let mut codec = WireCodec::new();
    let mut scratch = BytesMut::new();

    while let Some(frame) = outbound_rx.recv().await {
        let write_result = match frame {
            OutboundFrame::Raw(bytes) => write_half.write_all(&bytes).await,
            OutboundFrame::Message(message) => {
                scratch.clear();
                if let Err(e) = codec.encode(message, &mut scratch) {
                    error!(?connection_id, error = %e, "failed to encode outbound message");
                    continue;
                }
                write_half.write_all(&scratch).await
            }
        };
        if let Err(e) = write_result {
            warn!(?connection_id, error = %e, "write failed; closing peer");
            break;
        }
    }
    let _ = write_half.shutdown().await;
}
