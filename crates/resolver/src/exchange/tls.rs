use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use nullroute_dns::DnsMessage;
use rustls::{ClientConfig, RootCertStore, pki_types::ServerName};
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::TlsConnector;

use super::{Exchange, Timeouts, send_and_receive};

/// DNS over TLS (RFC 7858), TLS 1.3 only.
#[derive(Clone)]
pub struct TlsExchange {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    timeouts: Timeouts,
}

impl TlsExchange {
    /// Verify upstream certificates for `server_name` against the webpki roots.
    pub fn new(server_name: &str, timeouts: Timeouts) -> anyhow::Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self::with_config(Arc::new(config), server_name, timeouts)
    }

    pub fn with_config(config: Arc<ClientConfig>, server_name: &str, timeouts: Timeouts) -> anyhow::Result<Self> {
        let server_name = ServerName::try_from(server_name.to_owned())
            .with_context(|| format!("invalid tls server name: {}", server_name))?;

        Ok(Self {
            connector: TlsConnector::from(config),
            server_name,
            timeouts,
        })
    }
}

#[async_trait]
impl Exchange for TlsExchange {
    async fn exchange(&self, query: &DnsMessage, upstream: SocketAddr) -> anyhow::Result<DnsMessage> {
        let tcp = timeout(self.timeouts.connect, TcpStream::connect(upstream))
            .await
            .context("tcp connect timeout")??;
        tcp.set_nodelay(true)?;

        let mut stream = timeout(self.timeouts.connect, self.connector.connect(self.server_name.clone(), tcp))
            .await
            .context("tls handshake timeout")?
            .with_context(|| format!("tls handshake with {}", upstream))?;

        let raw = send_and_receive(&mut stream, &query.encode()?, &self.timeouts)
            .await
            .with_context(|| format!("tls exchange with {}", upstream))?;

        DnsMessage::decode(&raw).context("decoding upstream response")
    }
}
