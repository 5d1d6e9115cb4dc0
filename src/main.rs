use anyhow::Result;
use clap::Parser;
use rs_livefeed::{
    channel::LiveChannel,
    cli::Args,
    config::Config,
    events::create_event_channel,
    formatter::{MessageFormatter, OutputFormat},
    market_feed::MarketFeedView,
    monitoring::setup_metrics,
    tracing_setup::setup_tracing,
    ui::{UIController, UIOptions},
};
use serde_json::json;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup tracing/logging
    setup_tracing(&args.log_level, args.json_logs)?;

    info!("Starting live feed v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(&args)?;

    // Setup metrics server if enabled
    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    let (event_tx, event_rx) = create_event_channel();
    let channel = LiveChannel::builder(config.channel.clone())
        .events(event_tx)
        .build()?;
    let feed = MarketFeedView::attach(&channel);

    let format = OutputFormat::from(config.display.format.as_str());
    let mut ui = UIController::new(
        event_rx,
        format.clone(),
        UIOptions {
            colored: config.display.colored,
            quiet: config.display.quiet,
            max_messages: config.display.max_messages,
        },
    );
    let mut ui_task = tokio::spawn(async move { ui.run().await });

    let subscribe_request = json!({
        "action": "subscribe",
        "symbols": config.channel.simulation_timing.symbols,
    });
    let mut state_rx = channel.watch_state();
    let mut was_connected = false;

    channel.connect();
    info!("Channel started. Press Ctrl+C to shutdown...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = &mut ui_task => {
                info!("Display finished");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if state.is_connected() && !was_connected
                    && !channel.send_message(&subscribe_request)
                {
                    warn!("Subscribe request was not sent");
                }
                was_connected = state.is_connected();

                if state.is_exhausted() {
                    error!("Giving up on {}", channel.endpoint());
                    break;
                }
            }
        }
    }

    channel.disconnect();

    let formatter = MessageFormatter::new(format, config.display.colored);
    println!("{}", feed.with(|snapshot| formatter.summary(snapshot)));
    info!(health = %channel.health().to_json(), "Channel stopped");
    Ok(())
}
