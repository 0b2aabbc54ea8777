extern crate async_once_cell;
extern crate chrono;
#[macro_use]
extern crate clap;
extern crate crc32fast;
extern crate digest;
extern crate dirs;
extern crate dotenvy;
extern crate env_logger;
extern crate futures;
extern crate indexmap;
extern crate indicatif;
extern crate infer;
extern crate itertools;
#[macro_use]
extern crate lazy_static;
extern crate log;
extern crate phf;
extern crate rayon;
extern crate regex;
extern crate reqwest;
extern crate scraper;
extern crate serde;
extern crate serde_json;
extern crate sha1;
#[macro_use]
extern crate simple_error;
extern crate sqlx;
extern crate strum;
extern crate tempfile;
extern crate tokio;
extern crate tokio_util;
extern crate url;
extern crate urlencoding;
extern crate walkdir;
extern crate zip;

mod backpressure;
mod checksum;
mod config;
mod database;
mod download_roms;
mod events;
mod extractor;
mod fetcher;
mod filter;
mod listing;
mod manifest;
mod model;
mod name_parser;
mod progress;
mod rate_limiter;
mod scan_roms;
mod scrape_artwork;
mod screenscraper;
mod select_roms;
mod sidecar;
mod sync_catalog;
mod util;

use clap::{Arg, ArgAction, ArgMatches, Command};
use config::*;
use database::*;
use dotenvy::dotenv;
use env_logger::{Builder, Target};
use events::{DownloadEvent, EventSink, ScrapeEvent, SyncEvent};
use indicatif::ProgressBar;
use progress::*;
use simple_error::SimpleError;
use sqlx::sqlite::SqliteConnection;
use std::path::Path;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

type SimpleResult<T> = Result<T, SimpleError>;

fn download_roms_subcommand() -> Command {
    Command::new("download-roms")
        .about("Mirror remote ROM catalogs into the local library")
        .arg(
            Arg::new("SYSTEMS")
                .help("Systems to process")
                .required(false)
                .num_args(0..)
                .conflicts_with("ALL"),
        )
        .arg(
            Arg::new("ALL")
                .short('a')
                .long("all")
                .help("Process every configured system")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("JOBS")
                .short('j')
                .long("jobs")
                .help("Maximum parallel downloads")
                .required(false)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("PROFILE")
                .short('p')
                .long("profile")
                .help("Backpressure profile (fast, balanced, slow)")
                .required(false),
        )
        .arg(
            Arg::new("UPDATE")
                .short('u')
                .long("update")
                .help("Re-download files whose remote metadata changed")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ONE_GAME_ONE_ROM")
                .short('g')
                .long("1g1r")
                .help("Keep one representative per title")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("REGION")
                .short('r')
                .long("region")
                .help("Region preset applied before parsing (us, eu, jp)")
                .required(false),
        )
        .arg(
            Arg::new("INCLUDE_PATTERNS")
                .long("include")
                .help("Comma-separated glob patterns to include")
                .required(false),
        )
        .arg(
            Arg::new("EXCLUDE_PATTERNS")
                .long("exclude")
                .help("Comma-separated glob patterns to exclude")
                .required(false),
        )
        .arg(
            Arg::new("INCLUDE_LIST")
                .long("include-list")
                .help("File of basenames to include")
                .required(false),
        )
        .arg(
            Arg::new("EXCLUDE_LIST")
                .long("exclude-list")
                .help("File of basenames to exclude")
                .required(false),
        )
        .arg(
            Arg::new("PRERELEASE")
                .long("prerelease")
                .help("Keep betas, demos, prototypes and samples")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("UNLICENSED")
                .long("unlicensed")
                .help("Keep unlicensed releases")
                .required(false)
                .action(ArgAction::SetTrue),
        )
}

fn sync_catalog_subcommand() -> Command {
    Command::new("sync-catalog")
        .about("Synchronize remote listings into the catalog database")
        .arg(
            Arg::new("SYSTEMS")
                .help("Systems to process")
                .required(false)
                .num_args(0..)
                .conflicts_with("ALL"),
        )
        .arg(
            Arg::new("ALL")
                .short('a')
                .long("all")
                .help("Process every configured system")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("FORCE")
                .short('f')
                .long("force")
                .help("Ignore the stored directory timestamp")
                .required(false)
                .action(ArgAction::SetTrue),
        )
}

fn scan_roms_subcommand() -> Command {
    Command::new("scan-roms")
        .about("Scan the ROM root, write sidecars and reconcile the database")
        .arg(
            Arg::new("NO_HASH")
                .short('n')
                .long("no-hash")
                .help("Skip checksum computation")
                .required(false)
                .action(ArgAction::SetTrue),
        )
}

fn scrape_artwork_subcommand() -> Command {
    Command::new("scrape-artwork")
        .about("Fetch cover artwork from ScreenScraper for on-disk ROMs")
        .arg(
            Arg::new("SYSTEMS")
                .help("Systems to process")
                .required(false)
                .num_args(0..)
                .conflicts_with("ALL"),
        )
        .arg(
            Arg::new("ALL")
                .short('a')
                .long("all")
                .help("Process every configured system")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("OVERWRITE")
                .short('o')
                .long("overwrite")
                .help("Replace artwork that already exists")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("VIDEOS")
                .long("videos")
                .help("Also download video snaps")
                .required(false)
                .action(ArgAction::SetTrue),
        )
}

fn search_subcommand() -> Command {
    Command::new("search")
        .about("Search the catalog database")
        .arg(Arg::new("QUERY").help("Title or filename substring").required(false))
        .arg(
            Arg::new("SYSTEMS")
                .short('s')
                .long("systems")
                .help("Restrict to systems")
                .required(false)
                .num_args(1..),
        )
        .arg(
            Arg::new("REGIONS")
                .short('r')
                .long("regions")
                .help("Restrict to region codes")
                .required(false)
                .num_args(1..),
        )
        .arg(
            Arg::new("LOCAL")
                .short('l')
                .long("local")
                .help("Only show ROMs present on disk")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("NO_PRERELEASE")
                .long("no-prerelease")
                .help("Hide betas, demos, prototypes and samples")
                .required(false)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("LIMIT")
                .long("limit")
                .help("Maximum number of results")
                .required(false)
                .value_parser(value_parser!(i64)),
        )
        .arg(
            Arg::new("OFFSET")
                .long("offset")
                .help("Pagination offset")
                .required(false)
                .value_parser(value_parser!(i64)),
        )
}

fn config_subcommand() -> Command {
    Command::new("config").about("Print configured systems and resolved paths")
}

#[tokio::main]
async fn main() -> SimpleResult<()> {
    let matches = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommands([
            download_roms_subcommand(),
            sync_catalog_subcommand(),
            scan_roms_subcommand(),
            scrape_artwork_subcommand(),
            search_subcommand(),
            config_subcommand(),
        ])
        .get_matches();

    let Some(subcommand_name) = matches.subcommand_name() else {
        return Ok(());
    };

    dotenv().ok();
    let mut builder = Builder::from_env("RETROSD_LOG");
    // log to stdout because indicatif uses stderr
    builder.target(Target::Stdout);
    builder.init();

    let progress_bar = get_progress_bar(0, get_none_progress_style());
    let target_directory = get_target_directory();
    util::create_directory(&progress_bar, &target_directory, true).await?;

    let db_file = get_database_path(&target_directory);
    if !db_file.is_file() {
        try_with!(std::fs::File::create(&db_file), "Failed to create {:?}", db_file);
    }
    let pool = establish_connection(db_file.as_os_str().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();

    let cancellation = CancellationToken::new();
    {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancellation.cancel();
            }
        });
    }

    match subcommand_name {
        "download-roms" => {
            download_roms_main(
                &progress_bar,
                &target_directory,
                matches.subcommand_matches("download-roms").unwrap(),
                &cancellation,
            )
            .await?
        }
        "sync-catalog" => {
            sync_catalog_main(
                &mut connection,
                &progress_bar,
                matches.subcommand_matches("sync-catalog").unwrap(),
                &cancellation,
            )
            .await?
        }
        "scan-roms" => {
            let outcome = scan_roms::scan_roms(
                &mut connection,
                &progress_bar,
                &target_directory,
                !matches
                    .subcommand_matches("scan-roms")
                    .unwrap()
                    .get_flag("NO_HASH"),
                &cancellation,
            )
            .await?;
            progress_bar.println(format!(
                "Scanned {} files, pruned {} stale entries",
                outcome.scanned, outcome.pruned
            ));
            for (system, filename) in &outcome.missing_bios {
                progress_bar.println(format!("Missing BIOS for \"{}\": {}", system, filename));
            }
        }
        "scrape-artwork" => {
            scrape_artwork_main(
                &mut connection,
                &progress_bar,
                &target_directory,
                matches.subcommand_matches("scrape-artwork").unwrap(),
                &cancellation,
            )
            .await?
        }
        "search" => {
            search_main(
                &mut connection,
                &progress_bar,
                matches.subcommand_matches("search").unwrap(),
            )
            .await
        }
        "config" => {
            progress_bar.println(format!("Target directory: {}", target_directory.display()));
            progress_bar.println(format!("Database: {}", db_file.display()));
            for entry in &SYSTEM_ENTRIES {
                progress_bar.println(format!(
                    "{:<6} {:<10} {} ({})",
                    entry.key, entry.source, entry.dest_directory, entry.label
                ));
            }
        }
        _ => (),
    }

    drop(connection);
    close_connection(&pool).await;
    Ok(())
}

fn selected_entries(matches: &ArgMatches) -> SimpleResult<Vec<&'static SystemEntry>> {
    if matches.get_flag("ALL") {
        return Ok(SYSTEM_ENTRIES.iter().collect());
    }
    let keys: Vec<&String> = match matches.get_many::<String>("SYSTEMS") {
        Some(keys) => keys.collect(),
        None => bail!("No systems selected, pass system keys or --all"),
    };
    let mut entries = Vec::new();
    for key in keys {
        entries.push(find_system_entry(key)?);
    }
    Ok(entries)
}

async fn download_roms_main(
    progress_bar: &ProgressBar,
    target_directory: &Path,
    matches: &ArgMatches,
    cancellation: &CancellationToken,
) -> SimpleResult<()> {
    let entries = selected_entries(matches)?;

    let mut filter_options = filter::FilterOptions {
        exclusion_regex: filter::build_exclusion_regex(
            matches.get_flag("PRERELEASE"),
            matches.get_flag("UNLICENSED"),
            false,
            false,
        ),
        include_patterns: matches.get_one::<String>("INCLUDE_PATTERNS").cloned(),
        exclude_patterns: matches.get_one::<String>("EXCLUDE_PATTERNS").cloned(),
        ..filter::FilterOptions::default()
    };
    if let Some(region) = matches.get_one::<String>("REGION") {
        match region_preset_regex(region) {
            Some(pattern) => {
                filter_options.region_filter_regex = Some(regex::Regex::new(pattern).unwrap());
            }
            None => bail!("Unknown region preset \"{}\"", region),
        }
    }
    if let Some(path) = matches.get_one::<String>("INCLUDE_LIST") {
        filter_options.include_list = Some(filter::load_name_list(&path)?);
    }
    if let Some(path) = matches.get_one::<String>("EXCLUDE_LIST") {
        filter_options.exclude_list = Some(filter::load_name_list(&path)?);
    }

    let profile = match matches.get_one::<String>("PROFILE").map(String::as_str) {
        Some("fast") => backpressure::BackpressureProfile::Fast,
        Some("slow") => backpressure::BackpressureProfile::Slow,
        Some("balanced") | None => backpressure::BackpressureProfile::Balanced,
        Some(other) => bail!("Unknown profile \"{}\"", other),
    };
    let options = download_roms::DownloadOptions {
        jobs: matches
            .get_one::<usize>("JOBS")
            .copied()
            .unwrap_or_else(|| profile.max_concurrent()),
        profile,
        one_game_one_rom: matches.get_flag("ONE_GAME_ONE_ROM"),
        update: matches.get_flag("UPDATE"),
        filter: filter_options,
        ..download_roms::DownloadOptions::default()
    };

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<DownloadEvent>();
    let consumer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            log::debug!("{}", serde_json::to_string(&event).unwrap_or_default());
        }
    });

    let summaries = download_roms::download_systems(
        progress_bar,
        get_rom_client().await,
        target_directory,
        &entries,
        &download_roms::SourceUrls::default(),
        &options,
        &EventSink::new(sender),
        cancellation,
    )
    .await?;
    consumer.await.ok();

    for summary in &summaries {
        progress_bar.println(format!(
            "\"{}\": {} downloaded, {} skipped, {} failed ({} bytes in {} ms)",
            summary.system,
            summary.success,
            summary.skipped,
            summary.failed,
            summary.bytes_downloaded,
            summary.duration_ms
        ));
        for (task_id, message) in &summary.failures {
            progress_bar.println(format!("  {}: {}", task_id, message));
        }
    }
    Ok(())
}

async fn sync_catalog_main(
    connection: &mut SqliteConnection,
    progress_bar: &ProgressBar,
    matches: &ArgMatches,
    cancellation: &CancellationToken,
) -> SimpleResult<()> {
    let entries = selected_entries(matches)?;
    let force = matches.get_flag("FORCE");
    let events = EventSink::<SyncEvent>::disabled();
    let client = get_rom_client().await;

    for entry in entries {
        if cancellation.is_cancelled() {
            bail!("Cancelled");
        }
        let base_url = base_url_for_source(entry.source);
        if let Err(error) = sync_catalog::sync_system(
            connection,
            progress_bar,
            client,
            base_url,
            entry,
            force,
            &events,
            cancellation,
        )
        .await
        {
            progress_bar.println(format!("Sync failed for \"{}\": {}", entry.key, error));
        }
    }
    Ok(())
}

async fn scrape_artwork_main(
    connection: &mut SqliteConnection,
    progress_bar: &ProgressBar,
    target_directory: &Path,
    matches: &ArgMatches,
    cancellation: &CancellationToken,
) -> SimpleResult<()> {
    let entries = selected_entries(matches)?;
    let credentials = ScreenScraperCredentials::from_env()?;
    let api_client = screenscraper::ScreenScraperClient::new(credentials)?;

    let user = api_client.user_infos().await?;
    let lanes = user.max_threads().unwrap_or(1).max(1);
    progress_bar.println(format!("ScreenScraper allows {} threads", lanes));

    let options = scrape_artwork::ScrapeOptions {
        overwrite: matches.get_flag("OVERWRITE"),
        lanes,
        media_kinds: if matches.get_flag("VIDEOS") {
            vec![
                scrape_artwork::MediaKind::BoxFront,
                scrape_artwork::MediaKind::Screenshot,
                scrape_artwork::MediaKind::Video,
            ]
        } else {
            vec![
                scrape_artwork::MediaKind::BoxFront,
                scrape_artwork::MediaKind::Screenshot,
            ]
        },
        ..scrape_artwork::ScrapeOptions::default()
    };
    let limiter = rate_limiter::LaneRateLimiter::new(lanes, Duration::from_millis(1200));
    let events = EventSink::<ScrapeEvent>::disabled();

    for entry in entries {
        if cancellation.is_cancelled() {
            bail!("Cancelled");
        }
        let summary = scrape_artwork::scrape_system(
            connection,
            progress_bar,
            &api_client,
            get_media_client().await,
            &limiter,
            target_directory,
            entry,
            &options,
            &events,
            cancellation,
        )
        .await?;
        progress_bar.println(format!(
            "\"{}\": {} scraped, {} skipped, {} failed",
            entry.key, summary.success, summary.skipped, summary.failed
        ));
    }
    Ok(())
}

async fn search_main(
    connection: &mut SqliteConnection,
    progress_bar: &ProgressBar,
    matches: &ArgMatches,
) {
    let search = SearchQuery {
        query: matches
            .get_one::<String>("QUERY")
            .cloned()
            .unwrap_or_default(),
        systems: matches
            .get_many::<String>("SYSTEMS")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        regions: matches
            .get_many::<String>("REGIONS")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        local_only: matches.get_flag("LOCAL"),
        exclude_prerelease: matches.get_flag("NO_PRERELEASE"),
        limit: matches.get_one::<i64>("LIMIT").copied().unwrap_or(50),
        offset: matches.get_one::<i64>("OFFSET").copied().unwrap_or(0),
    };

    let hits = search_roms(connection, &search).await;
    for hit in &hits {
        let marker = if hit.local_path.is_some() { "*" } else { " " };
        progress_bar.println(format!(
            "{} [{}/{}] {} ({})",
            marker, hit.system, hit.source, hit.filename, hit.regions
        ));
    }
    progress_bar.println(format!("{} results", hits.len()));
}
