//! Common setup: config resolution, logging bootstrap, broker attachment,
//! bridge lifecycle.

use tokio::signal;
use tracing::info;

use tokay::bridge::{gen_sender_id, Bridge, BridgeConfig, BridgeFlags};
use tokay::broker::WsBrokerClient;
use tokay::config::Settings;
use tokay::logging;

use crate::error::CliError;
use crate::Cli;

/// Delivery buffering per subscription before backpressure reaches the broker.
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 4096;

/// Resolve configuration, start the bridge, and run it to completion.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let mut settings =
        Settings::load_from(&cli.config, &cli.section).map_err(CliError::Config)?;
    settings.apply_env_overrides();

    if let Some(port) = cli.port {
        settings.broker.port = port;
    }

    // the config file may demand more chatter than the command line did
    let verbosity = cli.effective_verbosity().max(settings.verbose);
    let _log_guard = logging::init_logging(verbosity, settings.log_dir.as_deref())
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    info!(version = tokay::VERSION, section = %cli.section, "tokay has started");

    settings.broker.validate().map_err(CliError::Config)?;

    let sender_id = gen_sender_id();

    let client = WsBrokerClient::connect(
        &settings.broker.host,
        settings.broker.port,
        &settings.broker.username,
        &settings.broker.password,
    )
    .await
    .map_err(CliError::Broker)?;

    let mut subscriptions = Vec::with_capacity(settings.broker.request_exchanges.len());
    for exchange in &settings.broker.request_exchanges {
        info!(exchange = %exchange.name, key = %exchange.key, "subscribing to request exchange");
        let subscription = client
            .subscribe(&exchange.name, &exchange.key, SUBSCRIPTION_CHANNEL_CAPACITY)
            .await
            .map_err(CliError::Broker)?;
        subscriptions.push(subscription);
    }

    let publisher = client.publisher(&settings.broker.response_exchange.name);

    let flags = BridgeFlags {
        dump_json: cli.jdump,
        no_exec: cli.no_exec,
    };
    let config = BridgeConfig::from_settings(&settings, sender_id, flags);

    let bridge = Bridge::start(config, subscriptions, publisher)
        .await
        .map_err(CliError::Bridge)?;

    let token = bridge.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, exiting gracefully");
        token.cancel();
    });

    bridge.run().await.map_err(CliError::Bridge)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {},
        _ = async {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut term) = signal(SignalKind::terminate()) {
                term.recv().await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {},
    }
}
