use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use huly_relay::channels::{ImapMailbox, ReqwestTransport};
use huly_relay::config::RelayConfig;
use huly_relay::pipeline::relay_loop::spawn_relay_loop;
use huly_relay::pipeline::{
    ChannelResolver, Dispatcher, NotificationBuilder, PatternLinkExtractor, RelayProcessor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().context("invalid configuration")?;

    eprintln!("📬 Huly Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Mailbox: {}@{}:{}/{}",
        config.imap.username, config.imap.host, config.imap.port, config.imap.folder
    );
    eprintln!("   Sender: {}", config.imap.sender);
    eprintln!("   Routing codes: {}", config.routing.len());
    eprintln!(
        "   Webhooks: {} + {} routed",
        config.webhooks.destinations.default_key(),
        config.webhooks.destinations.configured()
    );
    if config.run_once {
        eprintln!("   Mode: single pass\n");
    } else {
        eprintln!("   Mode: every {}s\n", config.poll_interval.as_secs());
    }

    let transport = Arc::new(ReqwestTransport::new(config.webhooks.timeout)?);
    let dispatcher = Dispatcher::new(
        transport,
        config.webhooks.destinations.clone(),
        config.webhooks.bot_name.clone(),
    );

    let processor = Arc::new(RelayProcessor::new(
        Arc::new(ImapMailbox::new(config.imap.clone())),
        ChannelResolver::new(config.routing.clone()),
        Box::new(PatternLinkExtractor::new()),
        NotificationBuilder::new(),
        dispatcher,
        config.housekeeping.clone(),
    ));

    if config.run_once {
        let report = processor.run_pass().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (handle, shutdown) = spawn_relay_loop(Arc::clone(&processor), config.poll_interval);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown requested");
    shutdown.trigger();
    handle.await.context("relay loop task failed")?;

    Ok(())
}
