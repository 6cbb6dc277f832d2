use std::{net::SocketAddr, sync::Arc};

use bytes::BytesMut;
use nullroute_context::{DnsRequestCtx, RequestType};
use nullroute_dns::{DnsMessage, MAX_UDP_PAYLOAD};
use nullroute_resolver::DnsResolver;
use tokio::net::UdpSocket;

use crate::handle_request;

/// Largest datagram read from a client.
const RECV_SIZE: usize = 4096;

/// Run the DNS server over UDP.
pub async fn run_udp(bind_addr: SocketAddr, resolver: Arc<dyn DnsResolver>) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(bind_addr).await?;
    tracing::info!("UDP listening on {}", bind_addr);
    serve_udp(socket, resolver).await
}

/// Answer queries arriving on an already bound socket, one task per datagram.
pub async fn serve_udp(socket: UdpSocket, resolver: Arc<dyn DnsResolver>) -> anyhow::Result<()> {
    let socket = Arc::new(socket);
    let mut buffer = BytesMut::with_capacity(RECV_SIZE);

    loop {
        buffer.resize(RECV_SIZE, 0);
        let (len, client) = socket.recv_from(&mut buffer[..]).await?;
        let raw = buffer.split_to(len).freeze();

        let sock = socket.clone();
        let resolver = resolver.clone();

        tokio::spawn(async move {
            let ctx = DnsRequestCtx::new(RequestType::UDP, client, raw);

            let Some(response) = handle_request(resolver.as_ref(), &ctx).await else {
                return;
            };

            if let Err(e) = write_udp_response(&sock, client, &response).await {
                tracing::warn!("Failed to write response to client {}: {:#}", client, e);
            }
        });
    }
}

/// Send `response`, replacing it with a truncated reply if it does not fit a
/// plain DNS datagram.
async fn write_udp_response(socket: &UdpSocket, client: SocketAddr, response: &DnsMessage) -> anyhow::Result<()> {
    let mut bytes = response.encode()?;
    if bytes.len() > MAX_UDP_PAYLOAD {
        tracing::debug!(client = %client, size = bytes.len(), "response too large for udp, truncating");
        bytes = response.truncated().encode()?;
    }

    socket.send_to(&bytes, client).await?;
    Ok(())
}
