//! TLS connection plumbing for IMAP.

use std::time::Duration;

use async_imap::Session;
use async_native_tls::TlsStream;
use tokio::net::TcpStream;
use tracing::info;

use crate::error::{Error, Result};

/// An IMAP session is generic over the stream type; ours is TLS-encrypted
/// TCP.
pub type ImapSession = Session<TlsStream<TcpStream>>;

/// How long connect + TLS + LOGIN may take before the attempt is abandoned.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Open a TLS connection and authenticate.
///
/// Login failures surface as [`Error::Auth`] so the scheduler can park the
/// account instead of retrying; transport failures are [`Error::Imap`].
pub async fn connect(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
) -> Result<ImapSession> {
    info!(host = %host, port = port, "connecting to IMAP server");

    let session = tokio::time::timeout(CONNECT_TIMEOUT, async {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| Error::Imap(format!("TCP connection failed: {}", e)))?;

        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls
            .connect(host, tcp)
            .await
            .map_err(|e| Error::Imap(format!("TLS handshake failed: {}", e)))?;

        let client = async_imap::Client::new(tls_stream);

        client
            .login(username, password)
            .await
            .map_err(|(e, _)| Error::Auth(format!("login failed: {}", e)))
    })
    .await
    .map_err(|_| Error::Imap(format!("connect to {}:{} timed out", host, port)))??;

    Ok(session)
}
