//! Output backends for finalized records.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netprobe_types::AggregateRecord;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SinkError;

/// Bound on connecting to a TCP output.
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// An external destination for records, such as a message bus publisher.
///
/// Implement this to plug a publisher into [`Output::sink`].
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Deliver one record.
    async fn publish(&self, record: &AggregateRecord) -> Result<(), SinkError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "sink"
    }
}

/// Output destination for aggregate records.
///
/// Every output receives every record, in window order.
pub enum Output {
    /// Append records to a file, one JSON object per line.
    File(PathBuf),

    /// Send records to a TCP server as newline-delimited JSON.
    ///
    /// A connection is opened per record.
    Tcp(String),

    /// Print records to standard output, one JSON object per line.
    Stdout,

    /// Send records through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    /// A record that finds the channel full is dropped with
    /// [`SinkError::Channel`].
    Channel(tokio::sync::mpsc::Sender<AggregateRecord>),

    /// Hand records to a [`RecordSink`].
    Sink(Arc<dyn RecordSink>),
}

impl Output {
    /// Create a file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use netprobe_engine::Output;
    ///
    /// let output = Output::file("records.jsonl");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a TCP output.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(addr.into())
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use netprobe_engine::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    ///
    /// // Later, receive records
    /// // while let Some(record) = rx.recv().await {
    /// //     println!("{} lost {}", record.time_label(), record.lost);
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, tokio::sync::mpsc::Receiver<AggregateRecord>) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Wrap a custom sink.
    pub fn sink(sink: impl RecordSink + 'static) -> Self {
        Output::Sink(Arc::new(sink))
    }

    /// Short name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Output::File(_) => "file",
            Output::Tcp(_) => "tcp",
            Output::Stdout => "stdout",
            Output::Channel(_) => "channel",
            Output::Sink(sink) => sink.name(),
        }
    }

    /// Emit a record to this output.
    pub(crate) async fn emit(&self, record: &AggregateRecord) -> Result<(), SinkError> {
        match self {
            Output::File(path) => {
                let line = json_line(record)?;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(&line).await?;
                file.flush().await?;
            }
            Output::Tcp(addr) => {
                let line = json_line(record)?;
                let mut stream =
                    tokio::time::timeout(TCP_CONNECT_TIMEOUT, tokio::net::TcpStream::connect(addr))
                        .await
                        .map_err(|_| SinkError::Timeout(TCP_CONNECT_TIMEOUT))??;
                stream.write_all(&line).await?;
                stream.shutdown().await?;
            }
            Output::Stdout => {
                let line = json_line(record)?;
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&line).await?;
                stdout.flush().await?;
            }
            Output::Channel(tx) => {
                // Never wait on a slow consumer
                tx.try_send(record.clone()).map_err(|err| match err {
                    TrySendError::Full(_) => SinkError::Channel("full".to_string()),
                    TrySendError::Closed(_) => SinkError::Channel("receiver dropped".to_string()),
                })?;
            }
            Output::Sink(sink) => sink.publish(record).await?,
        }
        Ok(())
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::File(path) => f.debug_tuple("File").field(path).finish(),
            Output::Tcp(addr) => f.debug_tuple("Tcp").field(addr).finish(),
            Output::Stdout => f.write_str("Stdout"),
            Output::Channel(_) => f.write_str("Channel"),
            Output::Sink(sink) => f.debug_tuple("Sink").field(&sink.name()).finish(),
        }
    }
}

fn json_line(record: &AggregateRecord) -> Result<Vec<u8>, SinkError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}
