use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use meetpoint::config::{self, ResolverConfig, SessionConfig};
use meetpoint::location::{BuiltinResolver, NominatimResolver, PlaceResolver};
use meetpoint::store::FileStore;
use meetpoint::{server, Session, SessionView};

/// Meetpoint: find the settlement nearest the middle of a list of cities.
///
/// Cities are kept between runs; each invocation adds to, removes from or
/// clears the saved list and prints the resulting state as JSON.
///
/// Examples:
///   meetpoint Paris Berlin Warsaw
///   meetpoint Paris                 (adds a second Paris)
///   meetpoint --remove Paris
///   meetpoint --clear Oslo Helsinki
///   meetpoint --offline Moscow Kazan
///   meetpoint --serve --port 3000
#[derive(Parser)]
#[command(name = "meetpoint", version, about, long_about = None)]
struct Cli {
    /// Cities to add, in order. Repeats count as separate people.
    cities: Vec<String>,

    /// Remove one occurrence of a city. May be given several times.
    #[arg(long, value_name = "CITY")]
    remove: Vec<String>,

    /// Start from an empty list.
    #[arg(long)]
    clear: bool,

    /// Offline mode: only use the built-in city dataset.
    #[arg(long)]
    offline: bool,

    /// Where session snapshots are kept. Defaults to ~/.meetpoint.
    #[arg(long, env = "MEETPOINT_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Pause between network lookups, in milliseconds.
    #[arg(long, default_value_t = config::DEFAULT_PACING.as_millis() as u64)]
    pacing_ms: u64,

    #[arg(long, env = "MEETPOINT_NOMINATIM_URL", default_value = config::DEFAULT_NOMINATIM_URL)]
    nominatim_url: String,

    #[arg(long, env = "MEETPOINT_USER_AGENT", default_value = config::DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Keep running and serve the session over HTTP.
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meetpoint=info")))
        .with_writer(std::io::stderr)
        .init();

    // ── Build the session ───────────────────────────────────────

    let resolver: Arc<dyn PlaceResolver> = if cli.offline {
        Arc::new(BuiltinResolver)
    } else {
        Arc::new(NominatimResolver::new(ResolverConfig {
            base_url: cli.nominatim_url.clone(),
            user_agent: cli.user_agent.clone(),
            ..ResolverConfig::default()
        }))
    };

    let store_dir = cli.store_dir.clone().unwrap_or_else(config::default_store_dir);
    let store = Arc::new(FileStore::new(store_dir));

    let session = Session::new(
        SessionConfig {
            pacing: Duration::from_millis(cli.pacing_ms),
            ..SessionConfig::default()
        },
        resolver,
        store,
    );
    session.restore().await;

    // ── Apply the requested edits ───────────────────────────────

    if cli.clear {
        session.clear();
    }
    for name in &cli.remove {
        if session.remove_city(name).is_none() {
            eprintln!("  Warning: '{}' is not in the list", name);
        }
    }
    for name in &cli.cities {
        if let Err(e) = session.add_city(name) {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    }
    session.wait_idle().await;

    if cli.serve {
        return match server::start(session, &cli.host, cli.port).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: Cannot serve on {}:{}: {}", cli.host, cli.port, e);
                ExitCode::FAILURE
            }
        };
    }

    // ── Report ──────────────────────────────────────────────────

    let view = session.view();
    eprint!("{}", render_summary(&view));

    match serde_json::to_string_pretty(&view) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn render_summary(view: &SessionView) -> String {
    let mut out = String::new();

    match &view.aggregate {
        Some(agg) => {
            out.push_str(&format!(
                "  \u{1F4CD} {} ({})\n",
                agg.result.full_address, agg.result.coordinate
            ));
            out.push_str(&format!(
                "     centroid of {} cities: {}\n",
                agg.resolved_count, agg.centroid
            ));
            for leg in &view.legs {
                let times = if leg.count > 1 { format!(" x{}", leg.count) } else { String::new() };
                out.push_str(&format!("     {:<20}{:>6} {:>9.1} km\n", leg.name, times, leg.distance_km));
            }
        }
        None if view.cities.is_empty() => out.push_str("  No cities yet.\n"),
        None => out.push_str("  No city could be located.\n"),
    }
    out
}
