use anyhow::Context as _;
use clap::{Parser, Subcommand};
use datafetch::FetchContext;
use datafetch::fetch::{DataSource, FetcherOptions, Pagination, Side, ValueParser};
use datafetch::realtime::{DataChangeEvent, PushConnector, RealtimeSubscription, SseConnector};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one component's data and print it as JSON
    Fetch {
        /// Component id registered for the data source
        #[arg(short, long)]
        component: String,

        /// One of json, csv, txt, api
        #[arg(short, long, default_value = "json")]
        source: String,

        /// External endpoint for the api source
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Use absolute URLs and the shared server cache
        #[arg(long)]
        server: bool,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print change events pushed for a component
    Watch {
        /// Push channel URL (text/event-stream)
        #[arg(short, long)]
        url: String,

        #[arg(short, long)]
        component: String,
    },
}

fn print_event(event: &DataChangeEvent) {
    let timestamp = chrono::Utc::now().format("%H:%M:%S").to_string();
    match serde_json::to_string(event) {
        Ok(line) => println!("[{timestamp}] {line}"),
        Err(e) => eprintln!("[{timestamp}] unprintable event: {e}"),
    }
}

async fn run_fetch(
    component: String,
    source: &str,
    endpoint: Option<String>,
    server: bool,
    page: Option<u32>,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let source: DataSource = source.parse()?;
    let side = Side::from(server);
    let ctx = FetchContext::from_env(side);

    let mut options = FetcherOptions::new(component.as_str(), source);
    if let Some(endpoint) = endpoint {
        options = options.with_endpoint(endpoint);
    }
    if let Some(limit) = limit {
        options = options.with_pagination(Pagination::new(page.unwrap_or(1), limit, true));
    }

    ctx.register(options, ValueParser);
    let outcome = ctx
        .fetch(&component, side)
        .await
        .with_context(|| format!("fetching {component}"))?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    ctx.shutdown();
    Ok(())
}

async fn run_watch(url: String, component: String) -> anyhow::Result<()> {
    let ctx = FetchContext::from_env(Side::Client);
    let connector: Arc<dyn PushConnector> = Arc::new(SseConnector::new(url));
    let mut subscription = RealtimeSubscription::start(
        ctx.bus(),
        component,
        Some(connector),
        ctx.config().reconnect,
        print_event,
    );

    let mut state = subscription.state_receiver();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = state.wait_for(|s| *s == datafetch::realtime::ConnectionState::GaveUp) => {
            eprintln!("push channel unavailable, giving up");
        }
    }

    subscription.close();
    ctx.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Fetch {
            component,
            source,
            endpoint,
            server,
            page,
            limit,
        } => run_fetch(component, &source, endpoint, server, page, limit).await,
        Command::Watch { url, component } => run_watch(url, component).await,
    }
}
