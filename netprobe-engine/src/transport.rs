//! Probe transports.
//!
//! A transport is split in two halves so sending and receiving can run as
//! independent tasks: [`ProbeSender`] transmits encoded frames to the echo
//! responder, [`ProbeReceiver`] yields whatever comes back.
//!
//! - **UDP**: one unconnected socket shared by both halves, one frame per
//!   datagram.
//! - **TCP**: newline-delimited frames over a single stream with
//!   `TCP_NODELAY`. After a write failure the stream is re-established by a
//!   background task; until it is up, sends fail immediately with
//!   [`TransportError::NotConnected`]. Each new read half is handed to the
//!   receiver.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Largest datagram accepted from the responder.
const MAX_DATAGRAM: usize = 2048;

/// Bound on a single TCP connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Which transport carries probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One probe per datagram.
    #[default]
    Udp,
    /// Newline-delimited probes over a stream.
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Udp => f.write_str("udp"),
            TransportKind::Tcp => f.write_str("tcp"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(TransportKind::Udp),
            "tcp" => Ok(TransportKind::Tcp),
            other => Err(format!("unknown transport '{other}', expected udp or tcp")),
        }
    }
}

/// Open a transport towards the echo responder at `target` (`host:port`).
///
/// UDP resolves the target and binds a local socket immediately. TCP makes
/// one connection attempt; if it fails, the sender retries in the background.
pub async fn open(
    kind: TransportKind,
    target: &str,
) -> Result<(ProbeSender, ProbeReceiver), TransportError> {
    match kind {
        TransportKind::Udp => {
            let peer = resolve(target).await?;
            let local: SocketAddr = match peer {
                SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
                SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
            };
            let socket = Arc::new(UdpSocket::bind(local).await?);
            debug!(local = %socket.local_addr()?, %peer, "udp transport ready");

            Ok((
                ProbeSender {
                    inner: SenderInner::Udp {
                        socket: socket.clone(),
                        peer,
                    },
                },
                ProbeReceiver {
                    inner: ReceiverInner::Udp {
                        socket,
                        buf: vec![0; MAX_DATAGRAM],
                    },
                },
            ))
        }
        TransportKind::Tcp => {
            let (readers_tx, readers_rx) = mpsc::unbounded_channel();
            let writer = match connect(target.to_string()).await {
                Ok(stream) => {
                    let (read, write) = stream.into_split();
                    readers_tx.send(read).map_err(|_| TransportError::Shutdown)?;
                    Some(write)
                }
                Err(err) => {
                    warn!(peer = target, error = %err, "initial tcp connect failed, will retry");
                    None
                }
            };
            Ok((
                ProbeSender {
                    inner: SenderInner::Tcp {
                        target: target.to_string(),
                        writer,
                        connecting: None,
                        readers: readers_tx,
                    },
                },
                ProbeReceiver {
                    inner: ReceiverInner::Tcp {
                        readers: readers_rx,
                        current: None,
                        line: Vec::with_capacity(128),
                    },
                },
            ))
        }
    }
}

async fn resolve(target: &str) -> Result<SocketAddr, TransportError> {
    tokio::net::lookup_host(target).await?.next().ok_or_else(|| {
        TransportError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{target} did not resolve to any address"),
        ))
    })
}

/// Sending half of a probe transport.
#[derive(Debug)]
pub struct ProbeSender {
    inner: SenderInner,
}

#[derive(Debug)]
enum SenderInner {
    Udp {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
    },
    Tcp {
        target: String,
        writer: Option<OwnedWriteHalf>,
        connecting: Option<JoinHandle<io::Result<TcpStream>>>,
        readers: mpsc::UnboundedSender<OwnedReadHalf>,
    },
}

impl ProbeSender {
    /// Transmit one encoded frame.
    ///
    /// Never waits for a TCP connection to be established.
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        match &mut self.inner {
            SenderInner::Udp { socket, peer } => {
                socket.send_to(frame, *peer).await?;
                Ok(())
            }
            SenderInner::Tcp {
                target,
                writer,
                connecting,
                readers,
            } => {
                let mut stream = match writer.take() {
                    Some(stream) => stream,
                    None => reconnect(target, connecting, readers).await?,
                };

                let mut line = Vec::with_capacity(frame.len() + 1);
                line.extend_from_slice(frame);
                line.push(b'\n');
                // A failed stream is dropped; the next probe reconnects
                stream.write_all(&line).await?;
                *writer = Some(stream);
                Ok(())
            }
        }
    }
}

/// Pick up a finished background connection, or start one.
async fn reconnect(
    target: &str,
    connecting: &mut Option<JoinHandle<io::Result<TcpStream>>>,
    readers: &mpsc::UnboundedSender<OwnedReadHalf>,
) -> Result<OwnedWriteHalf, TransportError> {
    match connecting.take() {
        Some(task) if task.is_finished() => {
            let stream = task.await.map_err(io::Error::other)??;
            let (read, write) = stream.into_split();
            readers.send(read).map_err(|_| TransportError::Shutdown)?;
            Ok(write)
        }
        Some(task) => {
            *connecting = Some(task);
            Err(TransportError::NotConnected)
        }
        None => {
            debug!(peer = target, "reconnecting tcp transport");
            *connecting = Some(tokio::spawn(connect(target.to_string())));
            Err(TransportError::NotConnected)
        }
    }
}

async fn connect(target: String) -> io::Result<TcpStream> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&target))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {target} timed out"),
            )
        })??;
    stream.set_nodelay(true)?;
    info!(peer = %stream.peer_addr()?, "tcp transport connected");
    Ok(stream)
}

/// Receiving half of a probe transport.
#[derive(Debug)]
pub struct ProbeReceiver {
    inner: ReceiverInner,
}

#[derive(Debug)]
enum ReceiverInner {
    Udp {
        socket: Arc<UdpSocket>,
        buf: Vec<u8>,
    },
    Tcp {
        readers: mpsc::UnboundedReceiver<OwnedReadHalf>,
        current: Option<BufReader<OwnedReadHalf>>,
        line: Vec<u8>,
    },
}

impl ProbeReceiver {
    /// Wait for the next echoed frame.
    ///
    /// Over TCP this waits for the sender to connect, and survives the
    /// stream being replaced. [`TransportError::Shutdown`] means the sender
    /// is gone and nothing more will arrive.
    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        match &mut self.inner {
            ReceiverInner::Udp { socket, buf } => {
                let (len, _from) = socket.recv_from(buf).await?;
                Ok(buf[..len].to_vec())
            }
            ReceiverInner::Tcp {
                readers,
                current,
                line,
            } => loop {
                if current.is_none() {
                    let read = readers.recv().await.ok_or(TransportError::Shutdown)?;
                    *current = Some(BufReader::new(read));
                }
                let Some(reader) = current.as_mut() else {
                    continue;
                };

                line.clear();
                match reader.read_until(b'\n', line).await {
                    Ok(0) => {
                        debug!("echo stream closed, waiting for reconnect");
                        *current = None;
                    }
                    Ok(_) => return Ok(std::mem::take(line)),
                    Err(err) => {
                        *current = None;
                        return Err(err.into());
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn transport_kind_parses_case_insensitively() {
        assert_eq!("UDP".parse::<TransportKind>().unwrap(), TransportKind::Udp);
        assert_eq!("tcp".parse::<TransportKind>().unwrap(), TransportKind::Tcp);
        assert!("quic".parse::<TransportKind>().is_err());
    }

    #[test]
    fn transport_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&TransportKind::Tcp).unwrap(), "\"tcp\"");
        let kind: TransportKind = serde_json::from_str("\"udp\"").unwrap();
        assert_eq!(kind, TransportKind::Udp);
    }

    #[tokio::test]
    async fn udp_round_trip_through_reflector() {
        let reflector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = reflector.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (len, from) = reflector.recv_from(&mut buf).await.unwrap();
            reflector.send_to(&buf[..len], from).await.unwrap();
        });

        let (mut tx, mut rx) = open(TransportKind::Udp, &addr.to_string()).await.unwrap();
        tx.send(b"{\"seq\":1}").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"{\"seq\":1}");
    }

    #[tokio::test]
    async fn tcp_frames_are_newline_delimited() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.split();
            let mut lines = BufReader::new(read);
            let mut line = Vec::new();
            for _ in 0..2 {
                line.clear();
                lines.read_until(b'\n', &mut line).await.unwrap();
                write.write_all(&line).await.unwrap();
            }
        });

        let (mut tx, mut rx) = open(TransportKind::Tcp, &addr.to_string()).await.unwrap();
        tx.send(b"first").await.unwrap();
        tx.send(b"second").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), b"first\n");
        assert_eq!(rx.recv().await.unwrap(), b"second\n");
    }

    #[tokio::test]
    async fn tcp_send_fails_fast_while_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (mut tx, _rx) = open(TransportKind::Tcp, &addr.to_string()).await.unwrap();
        for _ in 0..3 {
            let result = tokio::time::timeout(Duration::from_millis(100), tx.send(b"x"))
                .await
                .expect("send waited for a connection");
            assert!(matches!(
                result,
                Err(TransportError::NotConnected | TransportError::Io(_))
            ));
        }
    }

    #[tokio::test]
    async fn tcp_reconnects_in_background() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (mut tx, mut rx) = open(TransportKind::Tcp, &addr.to_string()).await.unwrap();
        assert!(matches!(tx.send(b"early").await, Err(TransportError::NotConnected)));

        let listener = TcpListener::bind(addr).await.unwrap();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let (read, mut write) = stream.split();
                    let mut lines = BufReader::new(read);
                    let mut line = Vec::new();
                    while lines.read_until(b'\n', &mut line).await.unwrap_or(0) > 0 {
                        write.write_all(&line).await.unwrap();
                        line.clear();
                    }
                });
            }
        });

        // The first attempt was refused; later sends retry until one lands
        let mut delivered = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if tx.send(b"late").await.is_ok() {
                delivered = true;
                break;
            }
        }
        assert!(delivered);
        assert_eq!(rx.recv().await.unwrap(), b"late\n");
    }

    #[tokio::test]
    async fn tcp_receiver_shuts_down_with_sender() {
        let (tx, mut rx) = open(TransportKind::Tcp, "127.0.0.1:9").await.unwrap();
        drop(tx);
        assert!(matches!(rx.recv().await, Err(TransportError::Shutdown)));
    }
}
