use std::{env, sync::Arc};

use anyhow::Context;
use config::{CONFIG_PATH_ENV, Config, DEFAULT_CONFIG_PATH, LogFormat, Transport, load_config};
use nullroute_resolver::{
    QueryDispatcher, RoundRobin,
    exchange::{Exchange, TcpExchange, TlsExchange, UdpExchange},
};
use nullroute_server::DnsServer;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking;
use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod blocklist;
mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (nb, _guard) = non_blocking(std::io::stdout());

    let config_path = env::var(CONFIG_PATH_ENV).unwrap_or(DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)?;

    let layer = match config.server.log_format {
        LogFormat::Text => fmt::layer().with_writer(nb).with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(nb).with_target(false).boxed(),
    };
    tracing_subscriber::registry()
        .with(layer.with_filter(LevelFilter::from(config.server.log_level)))
        .init();

    config.validate()?;

    let nameservers = config.upstream.socket_addrs();
    let upstreams = RoundRobin::new(&nameservers).context("building upstream selector")?;
    tracing::info!(?nameservers, transport = ?config.upstream.transport, "using upstream nameservers");

    let (blocklist, stats) = blocklist::load_blocklist(&config.blocklist)?;
    tracing::info!(
        path = ?config.blocklist.path,
        inserted = stats.inserted,
        skipped = stats.skipped,
        "blocking {} domains",
        blocklist.len()
    );

    let exchange = build_exchange(&config)?;
    let dispatcher = QueryDispatcher::new(Arc::new(blocklist), Arc::new(upstreams), exchange);

    let mut server = DnsServer::new(config.server.ip, Arc::new(dispatcher))
        .with_tcp_idle_timeout(config.server.tcp_idle_timeout());
    if let Some(port) = config.server.udp_port() {
        server = server.with_udp_port(port);
    }
    if let Some(port) = config.server.tcp_port() {
        server = server.with_tcp_port(port);
    }

    tokio::select! {
        r = server.run() => {
            if let Err(e) = r {
                tracing::error!("DNS server exited with error: {:#}", e);
                return Err(e);
            }
        },
        r = shutdown_signal() => {
            r?;
            tracing::info!("Shutting down DNS server...");
        },
    }

    Ok(())
}

fn build_exchange(config: &Config) -> anyhow::Result<Arc<dyn Exchange>> {
    let timeouts = config.upstream.timeouts();
    let exchange: Arc<dyn Exchange> = match config.upstream.transport {
        Transport::Udp => Arc::new(UdpExchange::new(timeouts)),
        Transport::Tcp => Arc::new(TcpExchange::new(timeouts)),
        Transport::Tls => {
            let server_name = config
                .upstream
                .tls_server_name
                .as_deref()
                .context("upstream.tls_server_name is required for the tls transport")?;
            Arc::new(TlsExchange::new(server_name, timeouts)?)
        }
    };
    Ok(exchange)
}

/// Resolves on SIGINT, or SIGTERM where supported.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = signal::ctrl_c() => r?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    Ok(())
}
