//! TCP listener binding.
//!
//! # Responsibilities
//! - Accept Go-style listen addresses (`":10080"` means every interface)
//! - Bind before any serving task starts, so bind failures are start-up
//!   failures

use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The listen address is empty.
    #[error("empty listen address")]
    EmptyAddress,
    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Expand a bare `":port"` to `"0.0.0.0:port"`; anything else is returned
/// trimmed.
pub fn normalize_listen_addr(listen: &str) -> String {
    let listen = listen.trim();
    if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_string()
    }
}

/// Bind a TCP listener on `listen`.
pub async fn bind(listen: &str) -> Result<TcpListener, ListenerError> {
    let addr = normalize_listen_addr(listen);
    if addr.is_empty() {
        return Err(ListenerError::EmptyAddress);
    }

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ListenerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    if let Ok(local_addr) = listener.local_addr() {
        tracing::debug!(address = %local_addr, "Listener bound");
    }
    Ok(listener)
}

/// The bound address, falling back to the unspecified address if the OS
/// cannot report it.
pub fn local_addr(listener: &TcpListener) -> SocketAddr {
    listener
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_listen_addr(":10080"), "0.0.0.0:10080");
        assert_eq!(normalize_listen_addr(" 127.0.0.1:80 "), "127.0.0.1:80");
        assert_eq!(normalize_listen_addr("[::1]:80"), "[::1]:80");
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        assert_ne!(local_addr(&listener).port(), 0);
    }

    #[tokio::test]
    async fn test_bind_errors() {
        assert!(matches!(bind("  ").await, Err(ListenerError::EmptyAddress)));

        let taken = bind("127.0.0.1:0").await.unwrap();
        let addr = local_addr(&taken).to_string();
        match bind(&addr).await {
            Err(ListenerError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected bind failure, got {other:?}"),
        }
    }
}
