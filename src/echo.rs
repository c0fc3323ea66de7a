//! The echo responder.
//!
//! Stateless: every UDP datagram is sent back to its source unchanged, and
//! every newline-terminated line on a TCP connection is written back on the
//! same connection.

use std::io;
use std::net::SocketAddr;

use netprobe_engine::TransportKind;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info, warn};

/// Largest datagram echoed back.
const MAX_DATAGRAM: usize = 65_535;

/// A bound echo responder.
///
/// # Example
///
/// ```rust,no_run
/// use netprobe::echo::EchoServer;
/// use netprobe_engine::TransportKind;
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let server = EchoServer::bind(TransportKind::Udp, "0.0.0.0:4401").await?;
///     server.run().await
/// }
/// ```
#[derive(Debug)]
pub struct EchoServer {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Udp(UdpSocket),
    Tcp(TcpListener),
}

impl EchoServer {
    /// Bind to `addr`.
    pub async fn bind(kind: TransportKind, addr: &str) -> io::Result<Self> {
        let inner = match kind {
            TransportKind::Udp => Inner::Udp(UdpSocket::bind(addr).await?),
            TransportKind::Tcp => Inner::Tcp(TcpListener::bind(addr).await?),
        };
        Ok(Self { inner })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.inner {
            Inner::Udp(socket) => socket.local_addr(),
            Inner::Tcp(listener) => listener.local_addr(),
        }
    }

    /// Echo until the task is cancelled.
    ///
    /// Errors on individual datagrams or connections are logged and do not
    /// stop the responder.
    pub async fn run(self) -> io::Result<()> {
        let addr = self.local_addr()?;
        match self.inner {
            Inner::Udp(socket) => {
                info!(%addr, "udp echo responder listening");
                let mut buf = vec![0u8; MAX_DATAGRAM];
                loop {
                    let (len, from) = match socket.recv_from(&mut buf).await {
                        Ok(received) => received,
                        Err(err) => {
                            warn!(error = %err, "udp receive failed");
                            continue;
                        }
                    };
                    if let Err(err) = socket.send_to(&buf[..len], from).await {
                        debug!(%from, error = %err, "udp echo failed");
                    }
                }
            }
            Inner::Tcp(listener) => {
                info!(%addr, "tcp echo responder listening");
                loop {
                    let (stream, peer) = match listener.accept().await {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!(error = %err, "tcp accept failed");
                            continue;
                        }
                    };
                    tokio::spawn(async move {
                        debug!(%peer, "echo connection opened");
                        if let Err(err) = echo_lines(stream).await {
                            debug!(%peer, error = %err, "echo connection failed");
                        }
                        debug!(%peer, "echo connection closed");
                    });
                }
            }
        }
    }
}

async fn echo_lines(stream: TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        write.write_all(&line).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_datagrams_come_back_unchanged() {
        let server = EchoServer::bind(TransportKind::Udp, "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"ping-1", addr).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping-1");
        assert_eq!(from, addr);
    }

    #[tokio::test]
    async fn tcp_lines_come_back_unchanged() {
        let server = EchoServer::bind(TransportKind::Tcp, "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"one\ntwo\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("one"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("two"));
    }
}
