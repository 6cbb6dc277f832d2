use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use nullroute_context::{DnsRequestCtx, RequestType};
use nullroute_resolver::DnsResolver;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};

use crate::handle_request;

/// Run the DNS server over TCP.
pub async fn run_tcp(
    bind_addr: SocketAddr,
    resolver: Arc<dyn DnsResolver>,
    idle_timeout: Duration,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("TCP listening on {}", bind_addr);
    serve_tcp(listener, resolver, idle_timeout).await
}

/// Accept connections on an already bound listener, one task per connection.
pub async fn serve_tcp(
    listener: TcpListener,
    resolver: Arc<dyn DnsResolver>,
    idle_timeout: Duration,
) -> anyhow::Result<()> {
    loop {
        let (stream, client) = listener.accept().await?;
        let resolver = resolver.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client, resolver.as_ref(), idle_timeout).await {
                tracing::warn!("TCP connection with {} failed: {:#}", client, e);
            }
        });
    }
}

/// Serve length-prefixed queries until the client closes the connection or
/// stays idle for too long.
async fn handle_connection(
    mut stream: TcpStream,
    client: SocketAddr,
    resolver: &dyn DnsResolver,
    idle_timeout: Duration,
) -> anyhow::Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        match timeout(idle_timeout, stream.read_exact(&mut len_buf)).await {
            Err(_) => {
                tracing::debug!(client = %client, "closing idle tcp connection");
                return Ok(());
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(_)) => {}
        }

        let mut buf = vec![0; u16::from_be_bytes(len_buf) as usize];
        timeout(idle_timeout, stream.read_exact(&mut buf)).await??;

        let ctx = DnsRequestCtx::new(RequestType::TCP, client, Bytes::from(buf));

        let Some(response) = handle_request(resolver, &ctx).await else {
            continue;
        };

        write_tcp_response(&mut stream, &response.encode()?).await?;
    }
}

/// Write a DNS friendly response to a TCP stream.
async fn write_tcp_response(stream: &mut TcpStream, response: &[u8]) -> anyhow::Result<()> {
    let len = u16::try_from(response.len())?;

    let mut frame = Vec::with_capacity(response.len() + 2);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(response);

    stream.write_all(&frame).await?;
    Ok(())
}
