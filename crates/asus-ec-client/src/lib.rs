//! Client library for fetching sensor readings from the ASUS EC daemon.
//!
//! Asks the daemon first; if it cannot be reached or answers with garbage,
//! reads the embedded controller directly in-process.

use asus_ec_hw::{EcReader, RegisterDevice, Snapshot, DEFAULT_PORT};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Largest response accepted from the daemon.
const MAX_RESPONSE: u64 = 64 * 1024;

/// Default bound on connecting to and reading from the daemon.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors from fetching a snapshot.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The daemon could not be reached or dropped the connection.
    #[error("Failed to reach daemon at {addr}: {source}")]
    Connection {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The daemon did not answer in time.
    #[error("Timed out waiting for daemon at {0}")]
    Timeout(SocketAddr),

    /// The daemon's answer is not a snapshot.
    #[error("Malformed response from daemon: {0}")]
    Decode(#[from] serde_json::Error),

    /// The direct register read failed.
    #[error("Direct EC read failed: {0}")]
    Device(#[from] asus_ec_hw::Error),
}

impl ClientError {
    /// Whether the failure should be answered by reading the device directly.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, ClientError::Device(_))
    }
}

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Cached by the daemon.
    Daemon,
    /// Read from the register file by this process.
    Direct,
}

/// A snapshot together with its origin.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub snapshot: Snapshot,
    pub source: Source,
}

/// Client for the daemon's loopback endpoint.
#[derive(Debug, Clone)]
pub struct QueryClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl QueryClient {
    /// Creates a client for `127.0.0.1:<port>`.
    pub fn new(port: u16) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the connect-and-read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Daemon address queried first.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Fetches the daemon's cached snapshot.
    pub async fn fetch(&self) -> Result<Snapshot, ClientError> {
        let body = tokio::time::timeout(self.timeout, self.read_response())
            .await
            .map_err(|_| ClientError::Timeout(self.addr))??;
        debug!("Received {} bytes from daemon", body.len());
        Ok(Snapshot::from_json(&body)?)
    }

    async fn read_response(&self) -> Result<Vec<u8>, ClientError> {
        let connection_error = |source| ClientError::Connection {
            addr: self.addr,
            source,
        };
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(connection_error)?;
        let mut body = Vec::new();
        stream
            .take(MAX_RESPONSE)
            .read_to_end(&mut body)
            .await
            .map_err(connection_error)?;
        Ok(body)
    }

    /// Fetches from the daemon, falling back to a one-shot direct read.
    ///
    /// `open` is only called when the daemon is unavailable, so the register
    /// file is never touched while a daemon answers.
    pub async fn query<D, F>(&self, open: F) -> Result<Fetched, ClientError>
    where
        D: RegisterDevice,
        F: FnOnce() -> asus_ec_hw::Result<EcReader<D>>,
    {
        match self.fetch().await {
            Ok(snapshot) => {
                return Ok(Fetched {
                    snapshot,
                    source: Source::Daemon,
                })
            }
            Err(e) if e.allows_fallback() => {
                debug!("Daemon unavailable ({}), reading EC directly", e);
            }
            Err(e) => return Err(e),
        }

        let mut reader = open()?;
        let snapshot = reader.update()?;
        Ok(Fetched {
            snapshot,
            source: Source::Direct,
        })
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asus_ec_hw::{MemoryDevice, RegisterWidth, SensorDescriptor};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn sensors() -> Vec<SensorDescriptor> {
        vec![SensorDescriptor::new(
            "MOTHERBOARD_TEMP",
            0x3c,
            RegisterWidth::Byte,
            "°C",
            0,
        )]
    }

    /// Answers every connection with `body`.
    async fn fake_daemon(body: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                stream.write_all(body).await.unwrap();
            }
        });
        port
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_daemon_snapshot_used_verbatim() {
        let port = fake_daemon(r#"{"CPU_TEMP":"45 °C","VCore":"1300 mV"}"#.as_bytes()).await;
        let client = QueryClient::new(port);

        let mut device = MemoryDevice::new();
        let fetched = client
            .query(|| EcReader::new(&mut device, sensors()))
            .await
            .unwrap();

        assert_eq!(fetched.source, Source::Daemon);
        assert_eq!(
            fetched.snapshot.to_json().unwrap(),
            r#"{"CPU_TEMP":"45 °C","VCore":"1300 mV"}"#
        );
        assert_eq!(device.read_count(), 0);
        assert!(device.page_writes().is_empty());
    }

    #[tokio::test]
    async fn test_empty_daemon_snapshot_is_an_answer() {
        let port = fake_daemon(b"{}").await;
        let fetched = QueryClient::new(port)
            .query(|| EcReader::new(MemoryDevice::new(), sensors()))
            .await
            .unwrap();
        assert_eq!(fetched.source, Source::Daemon);
        assert!(fetched.snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_refused_connection_falls_back() {
        let client = QueryClient::new(closed_port().await);
        assert!(matches!(
            client.fetch().await,
            Err(ClientError::Connection { .. })
        ));

        let device = MemoryDevice::new().with_register(0, 0x3c, 50);
        let fetched = client
            .query(|| EcReader::new(device, sensors()))
            .await
            .unwrap();
        assert_eq!(fetched.source, Source::Direct);
        assert_eq!(fetched.snapshot.get("MOTHERBOARD_TEMP"), Some("50 °C"));
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back() {
        let port = fake_daemon(b"not json").await;
        let client = QueryClient::new(port);
        assert!(matches!(client.fetch().await, Err(ClientError::Decode(_))));

        let fetched = client
            .query(|| EcReader::new(MemoryDevice::new(), sensors()))
            .await
            .unwrap();
        assert_eq!(fetched.source, Source::Direct);
    }

    #[tokio::test]
    async fn test_stalled_daemon_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accepts but never answers or closes.
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                held.push(stream);
            }
        });

        let client = QueryClient::new(port).with_timeout(Duration::from_millis(100));
        assert!(matches!(client.fetch().await, Err(ClientError::Timeout(_))));

        let fetched = client
            .query(|| EcReader::new(MemoryDevice::new(), sensors()))
            .await
            .unwrap();
        assert_eq!(fetched.source, Source::Direct);
    }

    #[tokio::test]
    async fn test_no_daemon_and_unreadable_device() {
        let client = QueryClient::new(closed_port().await);
        let err = client
            .query(|| EcReader::new(MemoryDevice::new().failing(), sensors()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Device(_)));
        assert!(!err.allows_fallback());
    }
}
