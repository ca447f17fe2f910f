mod action;
mod app;
mod auth;
mod cache;
mod config;
mod controller;
mod demo;
mod error;
mod event;
mod fetcher;
mod graphql;
mod tui;
mod types;
mod ui;

use std::fs::File;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::action::Action;
use crate::app::App;
use crate::cache::SessionCache;
use crate::config::Config;
use crate::demo::Demo;
use crate::error::RosterError;
use crate::fetcher::PagedFetcher;
use crate::graphql::GraphQl;
use crate::tui::EventHandler;
use crate::types::{CollectionSelector, Member};

/// Pick members from a directory, with incremental search.
///
/// Selected members are printed to stdout as JSON lines on exit.
#[derive(Debug, Parser)]
#[command(name = "roster", version, about)]
struct Cli {
    /// GraphQL endpoint, overriding backend.endpoint from the config file
    #[arg(long)]
    endpoint: Option<String>,

    /// Collection to browse
    #[arg(long, value_enum)]
    collection: Option<CollectionSelector>,

    /// Members fetched per page
    #[arg(long)]
    page_size: Option<u32>,

    /// Browse a generated in-memory directory instead of a backend
    #[arg(long)]
    demo: bool,

    /// Write logs to this file (filtered by RUST_LOG)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The terminal belongs to the UI, so logs only go to a file.
    let file_layer = match &cli.log_file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(File::create(path)?)),
        ),
        None => None,
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(file_layer)
        .init();

    let config = Config::load();
    let mut controller_config = config.selector.controller_config();
    if let Some(collection) = cli.collection {
        controller_config.selector = collection;
    }
    if let Some(page_size) = cli.page_size {
        controller_config.page_size = page_size.max(1);
    }

    let fetcher = build_fetcher(&cli, &config)?;
    tracing::info!(
        fetcher = fetcher.name(),
        collection = ?controller_config.selector,
        "starting"
    );

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    let result = run(fetcher, controller_config).await;

    tui::restore()?;

    for member in result? {
        println!("{}", serde_json::to_string(&member)?);
    }
    Ok(())
}

fn build_fetcher(cli: &Cli, config: &Config) -> Result<Arc<dyn PagedFetcher<Member>>, RosterError> {
    if cli.demo {
        return Ok(Arc::new(Demo::generated(250, Duration::from_millis(400))));
    }

    let endpoint = cli
        .endpoint
        .clone()
        .or_else(|| config.backend.endpoint.clone())
        .ok_or_else(|| {
            RosterError::Config(
                "no endpoint configured; pass --endpoint, set backend.endpoint, or use --demo"
                    .to_string(),
            )
        })?;
    let api_key = auth::load_api_key(config)?;
    Ok(Arc::new(GraphQl::new(endpoint, api_key)))
}

/// Run the selector until the user is done. Returns the chosen members,
/// or nothing when aborted with Ctrl-c.
async fn run(
    fetcher: Arc<dyn PagedFetcher<Member>>,
    controller_config: controller::ControllerConfig,
) -> Result<Vec<Member>, Box<dyn std::error::Error>> {
    let mut terminal = tui::init()?;

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();

    let mut app = App::new(fetcher, controller_config, SessionCache::new(), msg_tx);

    let render_rate = Duration::from_millis(16); // ~60fps
    let mut events = EventHandler::new(render_rate);

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                if event.is_quit() {
                    return Ok(Vec::new());
                }

                if event.is_draw() {
                    terminal.draw(|frame| ui::render(frame, &app))?;
                } else {
                    let action = app.handle_event(event);
                    if !matches!(action, Action::None) {
                        action_tx.send(action)?;
                    }
                }
            }
            Some(action) = action_rx.recv() => {
                app.update(action);
            }
            Some(msg) = msg_rx.recv() => {
                app.on_controller_msg(msg);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(std::mem::take(&mut app.selected))
}
