use super::SimpleResult;
use super::config::*;
use super::database::*;
use super::events::{EventSink, ScrapeEvent};
use super::model::LocalRom;
use super::rate_limiter::LaneRateLimiter;
use super::screenscraper::{GameQuery, ScrapedMedia, ScreenScraperClient};
use super::util::{format_rfc3339, utc_now_rfc3339};
use chrono::{Days, Utc};
use futures::StreamExt;
use indicatif::ProgressBar;
use log::{debug, warn};
use serde::Deserialize;
use sqlx::sqlite::SqliteConnection;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;
use strum::Display;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

const CACHE_TTL_DAYS: u64 = 30;
const MEDIA_ATTEMPTS: u32 = 3;
const MEDIA_MIN_SIZE: u64 = 1024;
const SNIFF_SIZE: usize = 512;
const MAX_MEDIA_CONCURRENCY: usize = 16;
const LEGACY_CACHE_FILENAME: &str = ".scraper-cache.json";

#[derive(Debug, Clone, Copy, Display, PartialEq, Eq)]
pub enum MediaKind {
    #[strum(serialize = "box")]
    BoxFront,
    #[strum(serialize = "box-back")]
    BoxBack,
    #[strum(serialize = "screenshot")]
    Screenshot,
    #[strum(serialize = "video")]
    Video,
}

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub media_kinds: Vec<MediaKind>,
    pub overwrite: bool,
    pub lanes: usize,
    pub min_delay: Duration,
    pub media_concurrency: usize,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            media_kinds: vec![MediaKind::BoxFront, MediaKind::Screenshot],
            overwrite: false,
            lanes: 1,
            min_delay: Duration::from_millis(1200),
            media_concurrency: 0,
        }
    }
}

impl ScrapeOptions {
    /// Media downloads default to the lookup concurrency, capped.
    pub fn media_budget(&self) -> usize {
        let budget = if self.media_concurrency > 0 {
            self.media_concurrency
        } else {
            self.lanes
        };
        budget.clamp(1, MAX_MEDIA_CONCURRENCY)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ScrapeSummary {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

struct MediaPlan {
    kind: MediaKind,
    url: String,
    target: PathBuf,
}

/// Scrape artwork for every on-disk ROM of one system: hash-keyed cache
/// lookup, rate-limited API calls, then validated media downloads.
#[allow(clippy::too_many_arguments)]
pub async fn scrape_system(
    connection: &mut SqliteConnection,
    progress_bar: &ProgressBar,
    api_client: &ScreenScraperClient,
    media_client: &reqwest::Client,
    limiter: &LaneRateLimiter,
    target_directory: &Path,
    entry: &SystemEntry,
    options: &ScrapeOptions,
    events: &EventSink<ScrapeEvent>,
    cancellation: &CancellationToken,
) -> SimpleResult<ScrapeSummary> {
    let started = Instant::now();
    let Some(system_id) = SCREENSCRAPER_SYSTEM_IDS.get(entry.key).copied() else {
        bail!("No ScreenScraper system id for \"{}\"", entry.key);
    };

    let system_directory = target_directory
        .join(ROMS_DIRECTORY)
        .join(entry.dest_directory);
    migrate_legacy_cache(connection, &system_directory).await?;
    delete_expired_scraper_cache_entries(connection, &utc_now_rfc3339()).await?;

    let roms = find_local_roms_by_system(connection, entry.key).await;
    events.emit(ScrapeEvent::Scan {
        system: entry.key.to_string(),
        count: roms.len(),
    });
    events.emit(ScrapeEvent::BatchStart {
        system: entry.key.to_string(),
        total: roms.len(),
    });
    progress_bar.println(format!(
        "Scraping {} ROMs for \"{}\"",
        roms.len(),
        entry.label
    ));

    let mut summary = ScrapeSummary::default();
    for rom in &roms {
        if cancellation.is_cancelled() {
            bail!("Cancelled");
        }
        let task_id = rom.local_path.clone();

        let lookup = lookup_media(
            connection,
            api_client,
            limiter,
            entry,
            system_id,
            rom,
            events,
            cancellation,
        )
        .await;
        let media = match lookup {
            Ok(media) => media,
            Err(error) => {
                if cancellation.is_cancelled() {
                    bail!("Cancelled");
                }
                warn!("Lookup failed for \"{}\": {}", rom.filename, error);
                events.emit(ScrapeEvent::Error {
                    task_id,
                    message: error.to_string(),
                });
                summary.failed += 1;
                continue;
            }
        };

        let media_directory = system_directory.join(MEDIA_DIRECTORY);
        let mut plans = Vec::new();
        let mut skipped = 0usize;
        for kind in &options.media_kinds {
            let Some(media_ref) = (match kind {
                MediaKind::BoxFront => media.box_front.as_ref(),
                MediaKind::BoxBack => media.box_back.as_ref(),
                MediaKind::Screenshot => media.screenshot.as_ref(),
                MediaKind::Video => media.video.as_ref(),
            }) else {
                continue;
            };
            let target =
                media_directory.join(format!("{}-{}.{}", rom.base_name, kind, media_ref.format));
            if target.is_file() && !options.overwrite {
                skipped += 1;
                continue;
            }
            plans.push(MediaPlan {
                kind: *kind,
                url: media_ref.url.clone(),
                target,
            });
        }

        if plans.is_empty() {
            summary.skipped += skipped.min(1);
            if skipped > 0 {
                events.emit(ScrapeEvent::Complete {
                    task_id: rom.local_path.clone(),
                });
            }
            continue;
        }
        fs::create_dir_all(&media_directory).await.ok();

        let failures = futures::stream::iter(plans.into_iter().map(|plan| {
            let task_id = rom.local_path.clone();
            let events = events.clone();
            async move {
                events.emit(ScrapeEvent::DownloadStart {
                    task_id: task_id.clone(),
                    kind: plan.kind.to_string(),
                });
                match download_media(media_client, &plan.url, &plan.target, cancellation).await {
                    Ok(()) => {
                        events.emit(ScrapeEvent::DownloadComplete {
                            task_id,
                            kind: plan.kind.to_string(),
                            path: plan.target.to_string_lossy().into_owned(),
                        });
                        None
                    }
                    Err(error) => {
                        events.emit(ScrapeEvent::DownloadError {
                            task_id,
                            kind: plan.kind.to_string(),
                            message: error.clone(),
                        });
                        Some(error)
                    }
                }
            }
        }))
        .buffer_unordered(options.media_budget())
        .filter_map(|failure| async move { failure })
        .collect::<Vec<String>>()
        .await;

        if cancellation.is_cancelled() {
            bail!("Cancelled");
        }
        if failures.is_empty() {
            summary.success += 1;
            events.emit(ScrapeEvent::Complete {
                task_id: rom.local_path.clone(),
            });
        } else {
            summary.failed += 1;
        }
    }

    summary.duration_ms = started.elapsed().as_millis() as u64;
    events.emit(ScrapeEvent::BatchComplete {
        system: entry.key.to_string(),
        success: summary.success,
        failed: summary.failed,
        skipped: summary.skipped,
        duration_ms: summary.duration_ms,
    });
    Ok(summary)
}

/// Cache key priority: content SHA-1, then CRC32, then normalized name and
/// size. The system key namespaces everything.
pub fn cache_key(system: &str, rom: &LocalRom) -> String {
    if let Some(sha1) = &rom.sha1 {
        return format!("{}:sha1:{}", system, sha1);
    }
    if let Some(crc32) = &rom.crc32 {
        return format!("{}:crc:{}", system, crc32);
    }
    let title = super::name_parser::parse_rom_name(&rom.filename)
        .title
        .to_lowercase();
    format!("{}:name:{}:{}", system, title, rom.file_size)
}

#[allow(clippy::too_many_arguments)]
async fn lookup_media(
    connection: &mut SqliteConnection,
    api_client: &ScreenScraperClient,
    limiter: &LaneRateLimiter,
    entry: &SystemEntry,
    system_id: u32,
    rom: &LocalRom,
    events: &EventSink<ScrapeEvent>,
    cancellation: &CancellationToken,
) -> SimpleResult<ScrapedMedia> {
    let key = cache_key(entry.key, rom);
    let now = utc_now_rfc3339();

    if let Some(cached) = find_scraper_cache_entry(connection, &key).await {
        if cached.expires_at > now {
            debug!("Cache hit for \"{}\"", rom.filename);
            events.emit(ScrapeEvent::Lookup {
                task_id: rom.local_path.clone(),
                cache_hit: true,
                game_name: cached.game_name.clone(),
            });
            let media: ScrapedMedia = serde_json::from_str(&cached.media_urls).unwrap_or_default();
            return Ok(media);
        }
    }

    let query = GameQuery {
        system_id,
        rom_name: rom.filename.clone(),
        rom_size: Some(rom.file_size as u64),
        crc: rom.crc32.clone(),
        sha1: rom.sha1.clone(),
    };
    let game = api_client.game_infos(limiter, &query, cancellation).await?;

    let expires_at = format_rfc3339(
        &Utc::now()
            .checked_add_days(Days::new(CACHE_TTL_DAYS))
            .unwrap(),
    );
    let media_urls = serde_json::to_string(&game.media).unwrap();
    upsert_scraper_cache_entry(
        connection,
        &key,
        Some(game.id),
        Some(&game.name),
        &media_urls,
        None,
        &now,
        &expires_at,
    )
    .await?;

    events.emit(ScrapeEvent::Lookup {
        task_id: rom.local_path.clone(),
        cache_hit: false,
        game_name: Some(game.name.clone()),
    });
    Ok(game.media)
}

/// Download one media file with validation. Invalid payloads are deleted
/// and retried a bounded number of times.
async fn download_media(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
    cancellation: &CancellationToken,
) -> Result<(), String> {
    let mut tmp_path = OsString::from(target.as_os_str());
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let mut last_error = String::from("Retries exhausted");
    for attempt in 0..MEDIA_ATTEMPTS {
        if attempt > 0 {
            tokio::select! {
                _ = cancellation.cancelled() => return Err(String::from("Cancelled")),
                _ = tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(attempt))) => (),
            }
        }
        match download_media_once(client, url, &tmp_path, cancellation).await {
            Ok(()) => {
                if let Err(error) = fs::rename(&tmp_path, target).await {
                    return Err(format!("Failed to rename {:?}: {}", tmp_path, error));
                }
                return Ok(());
            }
            Err(error) => {
                fs::remove_file(&tmp_path).await.ok();
                if error == "Cancelled" {
                    return Err(error);
                }
                debug!("Media download failed ({}): {}", url, error);
                last_error = error;
            }
        }
    }
    Err(last_error)
}

async fn download_media_once(
    client: &reqwest::Client,
    url: &str,
    tmp_path: &Path,
    cancellation: &CancellationToken,
) -> Result<(), String> {
    let response = tokio::select! {
        _ = cancellation.cancelled() => return Err(String::from("Cancelled")),
        response = client.get(url).send() => {
            response.map_err(|error| format!("Request failed: {}", error))?
        }
    };
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status().as_u16()));
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    let mut file = fs::File::create(tmp_path)
        .await
        .map_err(|error| format!("Failed to create {:?}: {}", tmp_path, error))?;
    let mut stream = response.bytes_stream();
    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_SIZE);
    let mut size = 0u64;
    loop {
        let chunk = tokio::select! {
            _ = cancellation.cancelled() => return Err(String::from("Cancelled")),
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                if head.len() < SNIFF_SIZE {
                    let room = SNIFF_SIZE - head.len();
                    head.extend_from_slice(&bytes[..bytes.len().min(room)]);
                }
                size += bytes.len() as u64;
                file.write_all(&bytes)
                    .await
                    .map_err(|error| format!("Failed to write {:?}: {}", tmp_path, error))?;
            }
            Some(Err(error)) => return Err(format!("Body read failed: {}", error)),
            None => break,
        }
    }
    file.flush()
        .await
        .map_err(|error| format!("Failed to flush {:?}: {}", tmp_path, error))?;

    validate_media(&head, size, content_type.as_deref())
}

/// Reject error pages and junk masquerading as media: too small, HTML or
/// JSON payloads, or unknown magic bytes.
pub fn validate_media(head: &[u8], size: u64, content_type: Option<&str>) -> Result<(), String> {
    if size < MEDIA_MIN_SIZE {
        return Err(format!("File too small ({} bytes)", size));
    }
    if let Some(content_type) = content_type {
        if content_type.starts_with("text/html") || content_type.starts_with("application/json") {
            return Err(format!("Rejected content type {}", content_type));
        }
    }
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start();
    if trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html") || trimmed.starts_with("<HTML")
    {
        return Err(String::from("Body looks like an HTML page"));
    }
    if trimmed.starts_with('{') && trimmed.contains("\"error\"") {
        return Err(String::from("Body looks like a JSON error"));
    }
    match infer::get(head) {
        Some(kind)
            if matches!(
                kind.mime_type(),
                "image/png" | "image/jpeg" | "image/gif" | "video/mp4"
            ) =>
        {
            Ok(())
        }
        Some(kind) => Err(format!("Unexpected media type {}", kind.mime_type())),
        None => Err(String::from("Unrecognized file contents")),
    }
}

#[derive(Debug, Deserialize)]
struct LegacyCacheEntry {
    #[serde(default)]
    game_id: Option<i64>,
    #[serde(default)]
    game_name: Option<String>,
    #[serde(default)]
    media_urls: Option<serde_json::Value>,
    #[serde(default)]
    scraped_at: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
}

/// One-time import of the JSON cache file older releases kept next to the
/// ROMs. Existing rows win; the file is renamed out of the way afterwards.
async fn migrate_legacy_cache(
    connection: &mut SqliteConnection,
    system_directory: &Path,
) -> SimpleResult<()> {
    let legacy_path = system_directory.join(LEGACY_CACHE_FILENAME);
    if !legacy_path.is_file() {
        return Ok(());
    }
    let contents = try_with!(
        fs::read(&legacy_path).await,
        "Failed to read {:?}",
        legacy_path
    );
    let entries: HashMap<String, LegacyCacheEntry> = match serde_json::from_slice(&contents) {
        Ok(entries) => entries,
        Err(error) => {
            warn!("Ignoring unreadable legacy cache {:?}: {}", legacy_path, error);
            HashMap::new()
        }
    };
    let now = utc_now_rfc3339();
    let default_expiry = format_rfc3339(
        &Utc::now()
            .checked_add_days(Days::new(CACHE_TTL_DAYS))
            .unwrap(),
    );
    for (key, entry) in entries {
        let media_urls = entry
            .media_urls
            .map(|value| value.to_string())
            .unwrap_or_else(|| String::from("{}"));
        insert_scraper_cache_entry_ignore(
            connection,
            &key,
            entry.game_id,
            entry.game_name.as_deref(),
            &media_urls,
            None,
            entry.scraped_at.as_deref().unwrap_or(&now),
            entry.expires_at.as_deref().unwrap_or(&default_expiry),
        )
        .await?;
    }

    let mut migrated = OsString::from(legacy_path.as_os_str());
    migrated.push(".migrated");
    try_with!(
        fs::rename(&legacy_path, PathBuf::from(migrated)).await,
        "Failed to rename {:?}",
        legacy_path
    );
    Ok(())
}

#[cfg(test)]
mod test_scrape_system;
