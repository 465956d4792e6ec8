//! A3S Image Search CLI - harvest image URLs from the command line.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use a3s_image_search::{
    api::{handle_search, ApiBody, SearchParams},
    chromium::ChromiumLauncher,
    EgressPool, HttpProbe, ReachabilityProbe, ScraperConfig, SearchService, SessionLauncher,
};

/// A3S Image Search - image URL harvester CLI
#[derive(Parser)]
#[command(name = "a3s-image-search")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for images
    Search(SearchArgs),

    /// List the egress identities that would be launched
    Identities(EgressArgs),
}

#[derive(Args)]
struct EgressArgs {
    /// Proxies (comma-separated hosts or proxy URLs)
    #[arg(short, long, env = "PROXY_LIST")]
    proxies: Option<String>,

    /// Port for proxies given without one
    #[arg(long, env = "PROXY_PORT")]
    proxy_port: Option<u16>,
}

#[derive(Args)]
struct SearchArgs {
    /// Search query
    query: String,

    /// Number of images (1-50, default 20)
    #[arg(short, long)]
    count: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Path to the Chrome/Chromium executable
    #[arg(long)]
    chrome: Option<String>,

    /// Show the browser windows
    #[arg(long)]
    headful: bool,

    #[command(flatten)]
    egress: EgressArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// One URL per line
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Search(args) => run_search(args).await,
        Commands::Identities(args) => list_identities(args),
    }
}

fn load_config(egress: &EgressArgs) -> Result<ScraperConfig> {
    let mut config = ScraperConfig::from_env()?;
    if let Some(ref list) = egress.proxies {
        config.set_proxy_list(list);
    }
    if let Some(port) = egress.proxy_port {
        config.proxy_port = port;
    }
    Ok(config)
}

fn list_identities(args: EgressArgs) -> Result<()> {
    let config = load_config(&args)?;
    let identities = config.identities();

    println!("Egress identities ({}):\n", identities.len());
    for (i, identity) in identities.iter().enumerate() {
        println!("  {}. {}", i + 1, identity);
    }
    if identities.len() == 1 {
        println!();
        println!("Set PROXY_LIST or pass -p to add proxy identities.");
    }
    Ok(())
}

/// Builds the HTTP client before launching any browser, so a failure there
/// leaves no Chrome process behind.
async fn start_service<P, F>(
    config: &ScraperConfig,
    launcher: &dyn SessionLauncher,
    make_probe: F,
) -> Result<SearchService>
where
    P: ReachabilityProbe + 'static,
    F: FnOnce() -> a3s_image_search::Result<P>,
{
    let probe = make_probe()?;
    let pool = EgressPool::start(launcher, config.identities())
        .await?
        .with_acquire_timeout(config.acquire_timeout());
    Ok(SearchService::from_config(
        Arc::new(pool),
        Arc::new(probe),
        config,
    ))
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let mut config = load_config(&args.egress)?;
    if args.chrome.is_some() {
        config.chrome_path = args.chrome.clone();
    }
    if args.headful {
        config.headless = false;
    }

    let launcher = ChromiumLauncher::from_config(&config);
    let service = start_service(&config, &launcher, || {
        HttpProbe::with_timeout(config.probe_timeout())
    })
    .await?;
    if matches!(args.format, OutputFormat::Text) {
        eprintln!("Started {} browser session(s)", service.pool().len());
    }

    let params = SearchParams {
        q: Some(args.query.clone()),
        count: args.count.clone(),
    };
    let start = Instant::now();
    let response = handle_search(Some(&service), &params).await;
    let elapsed = start.elapsed().as_millis();

    service.shutdown().await;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response.body)?);
        }
        OutputFormat::Text => match &response.body {
            ApiBody::Result(result) => {
                println!(
                    "\nImages for \"{}\" ({} found in {}ms):\n",
                    result.query, result.count, elapsed
                );
                for (i, url) in result.images.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, url);
                }
            }
            ApiBody::Error { error } => eprintln!("Error ({}): {}", response.status, error),
        },
        OutputFormat::Compact => match &response.body {
            ApiBody::Result(result) => {
                for url in &result.images {
                    println!("{}", url);
                }
            }
            ApiBody::Error { error } => eprintln!("{}", error),
        },
    }

    if response.status != 200 {
        anyhow::bail!("Search failed with status {}", response.status);
    }
    Ok(())
}
