//! TLS termination for the secure bind mode.
//!
//! The instance hands over already-read PEM bytes (loading key material
//! from disk is the host's job); invalid material is rejected at `start`
//! with [`ServerError::Tls`] before any socket is bound.

use crate::error::ServerError;
use may::net::TcpStream;
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use std::io::{self, BufReader};
use std::sync::Arc;

/// Builds rustls sessions over accepted coroutine TCP streams.
#[derive(Debug, Clone)]
pub struct TlsAcceptor {
    config: Arc<ServerConfig>,
}

impl TlsAcceptor {
    /// Build a server configuration from PEM-encoded private key and
    /// certificate chain bytes.
    pub fn from_pem_bytes(key_pem: &[u8], cert_pem: &[u8]) -> Result<Self, ServerError> {
        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::Tls(format!("failed to parse certificates: {e}")))?;
        if certs.is_empty() {
            return Err(ServerError::Tls("no certificates found".to_string()));
        }
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
            .map_err(|e| ServerError::Tls(format!("failed to parse private key: {e}")))?
            .ok_or_else(|| ServerError::Tls("no private key found".to_string()))?;

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(format!("rejected key/certificate pair: {e}")))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(TlsAcceptor {
            config: Arc::new(config),
        })
    }

    /// Wrap an accepted TCP stream in a TLS session. The handshake runs
    /// lazily on first read/write inside the connection coroutine.
    pub(crate) fn accept(
        &self,
        stream: TcpStream,
    ) -> io::Result<StreamOwned<ServerConnection, TcpStream>> {
        let session = ServerConnection::new(Arc::clone(&self.config))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(StreamOwned::new(session, stream))
    }
}
