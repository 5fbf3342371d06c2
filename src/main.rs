use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use dogmap_rt::protocol::models::DEFAULT_MODEL;
use dogmap_rt::transport::ws::DEFAULT_WS_URL;
use dogmap_rt::{
    AppConfig, BackendPlaces, Direction, HttpTokenSource, Item, Phase, Relay, RelayView, SendOutcome,
    ServerEvent, WsConnector,
};

/// DogMap: pet-friendly places voice assistant backend and relay
#[derive(Parser, Debug)]
#[command(name = "dogmap")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve `/token` and `/places`
    Serve {
        /// Bind address, overrides HOST
        #[arg(long)]
        host: Option<String>,

        /// Listen port, overrides PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Text chat with the assistant through a running backend
    Chat {
        /// Backend base URL
        #[arg(short, long, default_value = "http://127.0.0.1:4242")]
        backend: String,

        /// Realtime WebSocket endpoint
        #[arg(long, default_value = DEFAULT_WS_URL)]
        realtime_url: String,

        /// Realtime model
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Serve { host, port } => {
            let mut config = AppConfig::from_env().context("loading configuration")?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            tracing::debug!(?config, "configuration loaded");
            dogmap_rt::server::serve(&config).await?;
        }
        Commands::Chat { backend, realtime_url, model } => chat(&backend, realtime_url, model).await?,
    }
    Ok(())
}

async fn chat(backend: &str, realtime_url: String, model: String) -> anyhow::Result<()> {
    let relay = Relay::new(
        Arc::new(HttpTokenSource::new(backend)?),
        Arc::new(WsConnector::new(realtime_url, model)),
        Arc::new(BackendPlaces::new(backend)?),
    )
    .spawn();

    let mut view = relay.watch();
    tokio::spawn(async move {
        let mut last = RelayView::default();
        while view.changed().await.is_ok() {
            let current = view.borrow_and_update().clone();
            report(&last, &current);
            last = current;
        }
    });

    println!("Type a message, /start to connect, /stop to disconnect, /quit to exit.");
    relay.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/start" => relay.start().await?,
            "/stop" => relay.stop().await?,
            text => {
                if relay.send_text(text).await? == SendOutcome::Dropped {
                    println!("(not connected, use /start)");
                }
            }
        }
    }

    relay.stop().await?;
    Ok(())
}

fn report(last: &RelayView, current: &RelayView) {
    if last.phase != current.phase {
        let label = match current.phase {
            Phase::Idle => "disconnected",
            Phase::Negotiating => "connecting...",
            Phase::Active => "connected",
        };
        println!("[{label}]");
    }
    let fresh = current.events.len().saturating_sub(last.events.len());
    for logged in current.events[..fresh].iter().rev() {
        if logged.direction != Direction::Inbound {
            continue;
        }
        if let ServerEvent::ResponseDone { response, .. } = ServerEvent::from_value(logged.event.clone()) {
            for item in &response.output {
                if let Item::Message { content, .. } = item {
                    content.iter().filter_map(|part| part.text()).for_each(|text| println!("assistant: {text}"));
                }
            }
        }
    }
    if last.places != current.places {
        if current.places.is_empty() {
            println!("No places to show.");
        } else {
            println!("Recommended places:");
            for place in &current.places {
                println!("  - {place}");
            }
        }
    }
}
