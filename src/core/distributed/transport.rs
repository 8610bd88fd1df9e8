// SPDX-License-Identifier: MIT OR Apache-2.0

// src/core/distributed/transport.rs

//! Transport Layer
//!
//! Ordered, connection-oriented message channel used between clients, the
//! manager and storage nodes. Frames are a 4-byte big-endian length followed by
//! a bincode-encoded [`Message`]. Every connection is dedicated to one exchange;
//! connections are never pooled, so concurrent broadcasts to the same node never
//! interleave frames.

use super::protocol::Message;
use super::{DistributedError, DistributedResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Transport layer trait for cluster communication
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to a remote node
    async fn connect(&self, endpoint: &str) -> DistributedResult<Connection>;

    /// Listen for incoming connections
    async fn listen(&self, endpoint: &str) -> DistributedResult<Listener>;

    /// Send a message over a connection
    async fn send(&self, connection: &Connection, message: Message) -> DistributedResult<()>;

    /// Receive the next message from a connection
    async fn receive(&self, connection: &Connection) -> DistributedResult<Message>;

    /// Close a connection
    async fn close(&self, connection: Connection) -> DistributedResult<()>;

    /// Accept incoming connection from listener
    async fn accept(&self, listener: &Listener) -> DistributedResult<Connection>;
}

/// Connection to a remote peer
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub endpoint: String,
    pub(crate) handle: Arc<Mutex<TcpStream>>,
}

/// Listener for incoming connections
#[derive(Debug)]
pub struct Listener {
    pub endpoint: String,
    local_addr: String,
    pub(crate) handle: Arc<TcpListener>,
}

impl Listener {
    /// Actual address the listener bound to (useful for port 0 bindings)
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }
}

/// Configuration for TCP transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TcpTransportConfig {
    /// Connection timeout in milliseconds
    pub connection_timeout_ms: u64,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
    /// Enable TCP nodelay (disable Nagle's algorithm)
    pub nodelay: bool,
    /// Maximum frame size in bytes
    pub max_message_size: usize,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        TcpTransportConfig {
            connection_timeout_ms: 5000,
            read_timeout_ms: 30000,
            write_timeout_ms: 30000,
            nodelay: true,
            max_message_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// TCP transport implementation
#[derive(Debug, Default)]
pub struct TcpTransport {
    config: TcpTransportConfig,
}

impl TcpTransport {
    /// Create a new TCP transport with default configuration
    pub fn new() -> Self {
        TcpTransport {
            config: TcpTransportConfig::default(),
        }
    }

    /// Create a new TCP transport with custom configuration
    pub fn with_config(config: TcpTransportConfig) -> Self {
        TcpTransport { config }
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }

    fn configure_stream(&self, stream: &TcpStream) -> DistributedResult<()> {
        if self.config.nodelay {
            stream
                .set_nodelay(true)
                .map_err(|e| DistributedError::TransportError {
                    message: format!("Failed to set nodelay: {}", e),
                })?;
        }
        Ok(())
    }

    fn wrap_stream(&self, stream: TcpStream, endpoint: String) -> DistributedResult<Connection> {
        self.configure_stream(&stream)?;
        Ok(Connection {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint,
            handle: Arc::new(Mutex::new(stream)),
        })
    }

    /// Write one frame to a TCP stream
    async fn write_message(
        &self,
        stream: &mut TcpStream,
        message: &Message,
    ) -> DistributedResult<()> {
        let serialized =
            bincode::serialize(message).map_err(|e| DistributedError::TransportError {
                message: format!("Failed to serialize message: {}", e),
            })?;

        if serialized.len() > self.config.max_message_size {
            return Err(DistributedError::TransportError {
                message: format!(
                    "Message size {} exceeds maximum {}",
                    serialized.len(),
                    self.config.max_message_size
                ),
            });
        }

        let len = serialized.len() as u32;
        stream.write_all(&len.to_be_bytes()).await.map_err(|e| {
            DistributedError::TransportError {
                message: format!("Failed to write message length: {}", e),
            }
        })?;

        stream
            .write_all(&serialized)
            .await
            .map_err(|e| DistributedError::TransportError {
                message: format!("Failed to write message data: {}", e),
            })?;

        stream
            .flush()
            .await
            .map_err(|e| DistributedError::TransportError {
                message: format!("Failed to flush stream: {}", e),
            })?;

        Ok(())
    }

    /// Read one frame from a TCP stream
    async fn read_message(&self, stream: &mut TcpStream) -> DistributedResult<Message> {
        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| DistributedError::TransportError {
                message: format!("Failed to read message length: {}", e),
            })?;

        let len = u32::from_be_bytes(len_buf) as usize;

        if len > self.config.max_message_size {
            return Err(DistributedError::TransportError {
                message: format!(
                    "Message size {} exceeds maximum {}",
                    len, self.config.max_message_size
                ),
            });
        }

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| DistributedError::TransportError {
                message: format!("Failed to read message data: {}", e),
            })?;

        bincode::deserialize(&buf).map_err(|e| DistributedError::ProtocolError {
            message: format!("Failed to deserialize message: {}", e),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, endpoint: &str) -> DistributedResult<Connection> {
        let timeout = tokio::time::Duration::from_millis(self.config.connection_timeout_ms);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| DistributedError::TransportError {
                message: format!("Connection timeout to {}", endpoint),
            })?
            .map_err(|e| DistributedError::TransportError {
                message: format!("Failed to connect to {}: {}", endpoint, e),
            })?;

        self.wrap_stream(stream, endpoint.to_string())
    }

    async fn listen(&self, endpoint: &str) -> DistributedResult<Listener> {
        let listener =
            TcpListener::bind(endpoint)
                .await
                .map_err(|e| DistributedError::TransportError {
                    message: format!("Failed to bind to {}: {}", endpoint, e),
                })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DistributedError::TransportError {
                message: format!("Failed to read local address of {}: {}", endpoint, e),
            })?
            .to_string();

        Ok(Listener {
            endpoint: endpoint.to_string(),
            local_addr,
            handle: Arc::new(listener),
        })
    }

    async fn send(&self, connection: &Connection, message: Message) -> DistributedResult<()> {
        let mut stream = connection.handle.lock().await;
        let timeout = tokio::time::Duration::from_millis(self.config.write_timeout_ms);
        tokio::time::timeout(timeout, self.write_message(&mut stream, &message))
            .await
            .map_err(|_| DistributedError::TransportError {
                message: format!("Write timeout to {}", connection.endpoint),
            })?
    }

    async fn receive(&self, connection: &Connection) -> DistributedResult<Message> {
        let mut stream = connection.handle.lock().await;
        let timeout = tokio::time::Duration::from_millis(self.config.read_timeout_ms);
        tokio::time::timeout(timeout, self.read_message(&mut stream))
            .await
            .map_err(|_| DistributedError::TransportError {
                message: format!("Read timeout from {}", connection.endpoint),
            })?
    }

    async fn close(&self, connection: Connection) -> DistributedResult<()> {
        let mut stream = connection.handle.lock().await;
        // The peer may already be gone; the socket is released on drop either way.
        let _ = stream.shutdown().await;
        Ok(())
    }

    async fn accept(&self, listener: &Listener) -> DistributedResult<Connection> {
        let (stream, addr) =
            listener
                .handle
                .accept()
                .await
                .map_err(|e| DistributedError::TransportError {
                    message: format!("Failed to accept connection: {}", e),
                })?;

        self.wrap_stream(stream, addr.to_string())
    }
}

/// Open a dedicated connection, send one message and wait for one reply.
pub async fn round_trip(
    transport: &dyn Transport,
    endpoint: &str,
    message: Message,
) -> DistributedResult<Message> {
    let connection = transport.connect(endpoint).await?;
    let reply = match transport.send(&connection, message).await {
        Ok(()) => transport.receive(&connection).await,
        Err(e) => Err(e),
    };
    transport.close(connection).await?;
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::distributed::protocol::{MessageBody, SimpleResult};

    fn should_panic_on_socket_skip() -> bool {
        // In CI we generally expect loopback socket binds to work. If they don't, treat it as a
        // real failure to avoid silently masking regressions or misconfiguration.
        std::env::var("CI").is_ok() || std::env::var("GITHUB_ACTIONS").is_ok()
    }

    fn is_socket_permission_denied_message(message: &str) -> bool {
        let message = message.to_ascii_lowercase();
        message.contains("operation not permitted")
            || message.contains("permission denied")
            || message.contains("eacces")
            || message.contains("eperm")
            || message.contains("os error 1")
            || message.contains("os error 13")
    }

    async fn bind_or_skip(transport: &TcpTransport, test_name: &str) -> Option<Listener> {
        match transport.listen("127.0.0.1:0").await {
            Ok(listener) => Some(listener),
            Err(DistributedError::TransportError { message })
                if is_socket_permission_denied_message(&message) =>
            {
                if should_panic_on_socket_skip() {
                    panic!("CI environment cannot bind sockets; failing {test_name} ({message})");
                }
                eprintln!("skipping {test_name}: cannot bind sockets ({message})");
                None
            }
            Err(err) => panic!("Failed to start listener: {err:?}"),
        }
    }

    #[tokio::test]
    async fn test_tcp_transport_round_trip() {
        let transport = Arc::new(TcpTransport::new());
        let Some(listener) = bind_or_skip(&transport, "test_tcp_transport_round_trip").await
        else {
            return;
        };
        let addr = listener.local_addr().to_string();

        let acceptor = transport.clone();
        let acceptor_task = tokio::spawn(async move {
            let connection = acceptor.accept(&listener).await.unwrap();
            let message = acceptor.receive(&connection).await.unwrap();
            assert_eq!(message.body, MessageBody::KeepGoing);
            acceptor
                .send(&connection, Message::result(SimpleResult::ok()))
                .await
                .unwrap();
        });

        let reply = round_trip(transport.as_ref(), &addr, Message::keep_going())
            .await
            .unwrap();
        assert_eq!(reply.body, MessageBody::Result(SimpleResult::ok()));
        acceptor_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_write() {
        let transport = Arc::new(TcpTransport::with_config(TcpTransportConfig {
            max_message_size: 64,
            ..Default::default()
        }));
        let Some(listener) =
            bind_or_skip(&transport, "test_oversized_frame_rejected_before_write").await
        else {
            return;
        };
        let addr = listener.local_addr().to_string();

        let acceptor = transport.clone();
        let acceptor_task = tokio::spawn(async move {
            let _connection = acceptor.accept(&listener).await.unwrap();
        });

        let connection = transport.connect(&addr).await.unwrap();
        let err = transport
            .send(&connection, Message::chunk(vec![7u8; 1024]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
        acceptor_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let transport = TcpTransport::with_config(TcpTransportConfig {
            connection_timeout_ms: 500,
            ..Default::default()
        });
        let Some(listener) = bind_or_skip(&transport, "test_connect_to_closed_port_fails").await
        else {
            return;
        };
        let addr = listener.local_addr().to_string();
        drop(listener);

        assert!(transport.connect(&addr).await.is_err());
    }

    #[test]
    fn test_tcp_config_default() {
        let config = TcpTransportConfig::default();
        assert_eq!(config.connection_timeout_ms, 5000);
        assert!(config.nodelay);
        assert_eq!(config.max_message_size, 10 * 1024 * 1024);
    }
}
