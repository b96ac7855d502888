use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use moex_collector::fetcher::IssClient;
use moex_collector::publisher::TradePublisher;
use moex_collector::watermark::FileWatermarkStore;
use moex_collector::{server, shutdown, Collector, Config, Error};
use moex_middleware::{NatsTransport, SubjectBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    info!(
        engine = %config.engine,
        market = %config.market,
        poll_interval = ?config.poll_interval,
        base_url = %config.base_url,
        nats_url = %config.nats_url,
        subject_prefix = %config.subject_prefix,
        stream = %config.stream,
        state_file = ?config.state_file,
        "Starting moex-collector"
    );

    run(config).await?;
    info!("moex-collector stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("moex_collector=info,moex_middleware=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: Config) -> moex_collector::Result<()> {
    let transport = NatsTransport::connect(&config.nats_url).await?;
    info!(nats_url = %config.nats_url, "connected to NATS");

    let subjects = SubjectBuilder::with_prefix(config.subject_prefix.clone(), config.stream.clone());
    transport
        .ensure_stream(
            subjects.stream_name(),
            vec![subjects.all().to_string()],
            config.stream_max_age,
        )
        .await?;

    let transport = Arc::new(transport);
    let publisher = TradePublisher::new(transport.clone(), subjects);
    let client = IssClient::new(config.base_url.clone(), config.http_timeout)?;
    let store = Arc::new(FileWatermarkStore::new(config.state_file.clone()));

    let mut collector = Collector::new(config.collector_settings(), client, publisher, store).await;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown::cancel_on_signal(cancel.clone()));

    let server_cancel = cancel.clone();
    let listen_addr = config.listen_addr;
    let server_task = tokio::spawn(async move {
        // Collection keeps running without the endpoints
        if let Err(e) = server::serve(listen_addr, server_cancel).await {
            error!(error = %e, addr = %listen_addr, "health/metrics server failed");
        }
    });

    collector.run(cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = server_task.await {
        error!(error = %e, "health/metrics server task panicked");
    }
    transport.flush().await.map_err(Error::from)?;
    Ok(())
}
