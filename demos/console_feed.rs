//! Console feed - Follows the console's realtime stream from a terminal.
//!
//! Subscribes to `stats`, `rules` and `*`, logs every delivery, and keeps
//! the link alive until Ctrl+C.
//!
//! Usage:
//!   cargo run --example console_feed -- [origin] [--debug]
//!
//! The origin defaults to `http://localhost:8000`; `https://` origins
//! connect over `wss://` and need `--features native-tls`.

// ============================================================================
// Imports
// ============================================================================

use realtime_channel::{ChannelConfig, ChannelManager, TopicEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Args
// ============================================================================

const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    origin: String,
    debug: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self {
            origin: args
                .iter()
                .find(|a| !a.starts_with("--"))
                .cloned()
                .unwrap_or_else(|| DEFAULT_ORIGIN.to_string()),
            debug: args.iter().any(|a| a == "--debug"),
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug {
        "realtime_channel=debug,console_feed=debug"
    } else {
        "realtime_channel=info,console_feed=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = ChannelConfig::from_origin(&args.origin)?;
    info!(endpoint = %config.endpoint, "Following console feed");

    let manager = ChannelManager::with_websocket(config)?;

    manager.on_connect(|| info!("Feed connected"));
    manager.on_disconnect(|close| warn!(code = close.code, reason = %close.reason, "Feed disconnected"));
    manager.on_error(|error| warn!(%error, "Feed error"));

    manager.subscribe("stats", |message| {
        if let TopicEvent::StatsUpdate { data } = message.parse_event() {
            info!(%data, "Stats");
        }
        Ok(())
    });

    manager.subscribe("rules", |message| {
        if let TopicEvent::RuleChange {
            rule_id, action, ..
        } = message.parse_event()
        {
            info!(rule_id, action = ?action, "Rule changed");
        }
        Ok(())
    });

    manager.subscribe("*", |message| {
        info!(
            message_type = message.message_type().unwrap_or("?"),
            topic = ?message.resolve_topic().map(|t| t.to_string()),
            "Message"
        );
        Ok(())
    });

    manager.connect();

    tokio::signal::ctrl_c().await?;
    info!(stats = %serde_json::to_string(&manager.stats())?, "Shutting down");
    manager.disconnect();

    Ok(())
}
