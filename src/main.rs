//! Intrusion correlator - cross-camera identity resolution and event correlation
//!
//! Batch tool run over a site's per-camera trajectory files:
//! assigns global identities across cameras, rebuilds intrusion events from
//! zone polygons, then enriches and deduplicates them.
//!
//! Module structure:
//! - `domain/` - Core types (Track, Event, Polygon, identifiers)
//! - `io/` - Files (track store, JSONL events, run report)
//! - `services/` - Zones, camera network, matcher, intrusion, correlator
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::{Parser, Subcommand};
use intrusion_correlator::infra::Config;
use intrusion_correlator::services::{AppearanceIndex, Pipeline};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Intrusion correlator - global identities and correlated intrusion events
#[derive(Parser, Debug)]
#[command(
    name = "intrusion-correlator",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"),
    about
)]
struct Args {
    /// Path to TOML configuration file (defaults to $CONFIG_FILE, then
    /// config/default.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full batch: match, scan, correlate, report (default)
    Run {
        /// Append rebuilt raw events instead of replacing the file
        #[arg(long)]
        append_raw: bool,
    },
    /// Assign global identities and save them into the track files
    Match {
        /// Override the cosine distance threshold
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Rebuild raw intrusion events from trajectories
    Scan {
        /// Append to the raw events file instead of replacing it
        #[arg(long)]
        append: bool,
        /// Override the confirmation dwell time (seconds)
        #[arg(long)]
        min_duration: Option<f64>,
    },
    /// Enrich and deduplicate the raw events file
    Correlate,
    /// Validate the zone store and log its contents
    Zones,
}

fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path);

    let command = args.command.unwrap_or(Command::Run { append_raw: false });
    match &command {
        Command::Match { threshold: Some(t) } => config = config.with_match_threshold(*t),
        Command::Scan { min_duration: Some(s), .. } => config = config.with_min_duration_s(*s),
        _ => {}
    }

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        git_hash = %env!("GIT_HASH"),
        config_file = %config.config_file(),
        site = %config.site_id(),
        match_threshold = %config.match_threshold(),
        min_duration_s = %config.min_duration_s(),
        zone_test = ?config.zone_test(),
        "intrusion_correlator_starting"
    );

    let pipeline = Pipeline::new(config, env!("CARGO_PKG_VERSION"));

    match command {
        Command::Run { append_raw } => {
            pipeline.run(append_raw)?;
        }
        Command::Match { .. } => {
            let network = pipeline.load_network();
            let mut loaded = pipeline.load_tracks()?;
            let (registry, stats) = pipeline.match_identities(&mut loaded, &network)?;
            info!(
                identities = %registry.len(),
                matched = %stats.tracks_matched,
                without_embedding = %stats.tracks_without_embedding,
                without_frames = %stats.tracks_without_frames,
                "match_complete"
            );
            pipeline.metrics().report().log();
        }
        Command::Scan { append, .. } => {
            let zones = pipeline.load_zones()?;
            let loaded = pipeline.load_tracks()?;
            let (events, stats) = pipeline.scan(&loaded, &zones, append)?;
            info!(
                events = %events.len(),
                tracks = %stats.tracks_scanned,
                frames = %stats.frames_scanned,
                "scan_complete"
            );
        }
        Command::Correlate => {
            let zones = pipeline.load_zones()?;
            let network = pipeline.load_network();
            let loaded = pipeline.load_tracks()?;
            let raw = pipeline.read_raw_events()?;
            let index = AppearanceIndex::new(&loaded.files);
            let (_, stats, written) = pipeline.correlate(raw, &index, &network, &zones)?;
            info!(
                events = %written,
                enriched = %stats.events_enriched,
                with_global_id = %stats.events_with_global_id,
                "correlate_complete"
            );
            pipeline.metrics().report().log();
        }
        Command::Zones => {
            let zones = pipeline.load_zones()?;
            zones.log_summary();
        }
    }

    Ok(())
}
