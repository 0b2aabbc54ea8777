use super::SimpleResult;
use super::backpressure::{BackpressureController, BackpressureProfile};
use super::config::*;
use super::events::{DownloadEvent, EventSink};
use super::extractor::{ExtractOptions, extract_zip};
use super::fetcher::{FetchOptions, fetch_file};
use super::filter::{FilterOptions, filter_filenames};
use super::listing::{
    fetch_directory_index, parse_directory_last_modified, parse_directory_listing,
};
use super::manifest::{Manifest, load_manifest, save_manifest};
use super::model::CatalogSource;
use super::select_roms::{SelectOptions, select_one_per_title};
use super::util::format_rfc3339;
use futures::StreamExt;
use indicatif::ProgressBar;
use log::debug;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_BYTES_ESTIMATE: u64 = 8 * 1024 * 1024;
const EXTRACT_CONCURRENCY_CAP: usize = 8;

/// Base URLs per catalog source, injectable so tests can point at a local
/// server.
#[derive(Debug, Clone)]
pub struct SourceUrls {
    pub no_intro: String,
    pub redump: String,
}

impl Default for SourceUrls {
    fn default() -> Self {
        Self {
            no_intro: String::from(NOINTRO_BASE_URL),
            redump: String::from(REDUMP_BASE_URL),
        }
    }
}

impl SourceUrls {
    pub fn for_source(&self, source: CatalogSource) -> &str {
        match source {
            CatalogSource::NoIntro => &self.no_intro,
            CatalogSource::Redump => &self.redump,
        }
    }
}

pub struct DownloadOptions {
    pub jobs: usize,
    pub profile: BackpressureProfile,
    pub one_game_one_rom: bool,
    pub update: bool,
    pub retries: u32,
    pub delay: Duration,
    pub filter: FilterOptions,
    pub select: SelectOptions,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            jobs: BackpressureProfile::Balanced.max_concurrent(),
            profile: BackpressureProfile::Balanced,
            one_game_one_rom: false,
            update: false,
            retries: 3,
            delay: Duration::from_secs(1),
            filter: FilterOptions::default(),
            select: SelectOptions::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SystemSummary {
    pub system: String,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub bytes_downloaded: u64,
    pub duration_ms: u64,
    pub failures: Vec<(String, String)>,
}

struct ManifestChange {
    key: String,
    filename: String,
    size: Option<u64>,
    etag: Option<String>,
    last_modified: Option<String>,
}

struct FetchTask {
    task_id: String,
    filename: String,
    url: String,
    destination: PathBuf,
    expected_size: Option<u64>,
    last_modified: Option<String>,
}

enum TaskResult {
    Success {
        bytes_downloaded: u64,
        skipped: bool,
        change: Option<ManifestChange>,
    },
    Failure {
        task_id: String,
        message: String,
    },
    Cancelled,
}

/// Run every requested system, a few at a time, and write the manifest once
/// at the end. A failed system never aborts its siblings.
#[allow(clippy::too_many_arguments)]
pub async fn download_systems(
    progress_bar: &ProgressBar,
    client: &reqwest::Client,
    target_directory: &Path,
    entries: &[&SystemEntry],
    source_urls: &SourceUrls,
    options: &DownloadOptions,
    events: &EventSink<DownloadEvent>,
    cancellation: &CancellationToken,
) -> SimpleResult<Vec<SystemSummary>> {
    let mut manifest = load_manifest(target_directory).await;

    let system_concurrency = (options.jobs / 2).max(1);
    let results: Vec<_> = futures::stream::iter(entries.iter().map(|entry| {
        let manifest = &manifest;
        async move {
            let result = download_system(
                progress_bar,
                client,
                target_directory,
                entry,
                source_urls,
                manifest,
                options,
                events,
                cancellation,
            )
            .await;
            (*entry, result)
        }
    }))
    .buffer_unordered(system_concurrency)
    .collect()
    .await;

    let mut summaries = Vec::new();
    for (entry, result) in results {
        match result {
            Ok((summary, changes, directory_last_modified)) => {
                for change in changes {
                    manifest.record_file(
                        &change.key,
                        &change.filename,
                        change.size,
                        change.etag,
                        change.last_modified,
                    );
                }
                if let Some(last_modified) = directory_last_modified {
                    manifest.record_directory(entry.key, Some(last_modified));
                }
                summaries.push(summary);
            }
            Err(error) => {
                // a listing failure fails the system, not the engine
                summaries.push(SystemSummary {
                    system: entry.key.to_string(),
                    failed: 1,
                    failures: vec![(String::from("listing"), error.to_string())],
                    ..SystemSummary::default()
                });
            }
        }
    }

    save_manifest(target_directory, &manifest).await?;
    Ok(summaries)
}

/// One system's pipeline: listing, filter, selection, reconciliation, then
/// fetch and extract under backpressure.
#[allow(clippy::too_many_arguments)]
async fn download_system(
    progress_bar: &ProgressBar,
    client: &reqwest::Client,
    target_directory: &Path,
    entry: &SystemEntry,
    source_urls: &SourceUrls,
    manifest: &Manifest,
    options: &DownloadOptions,
    events: &EventSink<DownloadEvent>,
    cancellation: &CancellationToken,
) -> SimpleResult<(SystemSummary, Vec<ManifestChange>, Option<String>)> {
    let started = Instant::now();
    let mut summary = SystemSummary {
        system: entry.key.to_string(),
        ..SystemSummary::default()
    };

    let base_url = source_urls.for_source(entry.source);
    let listing_url = format!("{}/{}", base_url, entry.remote_path.replace(' ', "%20"));
    progress_bar.println(format!("Processing \"{}\"", entry.label));
    let html = fetch_directory_index(client, &listing_url, cancellation).await?;
    let directory_last_modified =
        parse_directory_last_modified(&html).map(|timestamp| format_rfc3339(&timestamp));

    if options.update
        && manifest.is_directory_current(entry.key, directory_last_modified.as_deref())
    {
        debug!("\"{}\" is unchanged, skipping", entry.label);
        summary.duration_ms = started.elapsed().as_millis() as u64;
        emit_batch_complete(events, &summary);
        return Ok((summary, Vec::new(), directory_last_modified));
    }

    let archive_pattern = try_with!(
        Regex::new(entry.archive_pattern),
        "Invalid archive pattern for \"{}\"",
        entry.key
    );
    let files = parse_directory_listing(&html, &archive_pattern);
    events.emit(DownloadEvent::Listing {
        system: entry.key.to_string(),
        count: files.len(),
    });

    let filenames: Vec<String> = files.iter().map(|file| file.filename.clone()).collect();
    let mut kept = filter_filenames(&filenames, &options.filter);
    if options.one_game_one_rom {
        kept = select_one_per_title(&kept, &options.select);
    }
    events.emit(DownloadEvent::Filtered {
        system: entry.key.to_string(),
        kept: kept.len(),
        total: filenames.len(),
    });

    let by_name: HashMap<&str, &super::listing::RemoteFile> = files
        .iter()
        .map(|file| (file.filename.as_str(), file))
        .collect();
    let dest_directory = target_directory
        .join(ROMS_DIRECTORY)
        .join(entry.dest_directory);
    let (existing_names, existing_stems) = read_existing(&dest_directory);

    let mut tasks = Vec::new();
    let mut changes = Vec::new();
    let mut seen_destinations = HashSet::new();
    for filename in &kept {
        let remote = by_name.get(filename.as_str()).unwrap();
        let key = format!("{}/{}", entry.dest_directory, filename);
        if !seen_destinations.insert(key.clone()) {
            continue;
        }
        let last_modified = remote
            .last_modified
            .map(|timestamp| format_rfc3339(&timestamp));
        let expected_size = remote.size.filter(|size| *size > 0);

        let present = existing_names.contains(filename.as_str())
            || existing_stems.contains(&stem_of(filename).to_lowercase());
        if present {
            let current =
                !options.update || manifest.is_file_current(&key, expected_size, last_modified.as_deref());
            if current {
                summary.skipped += 1;
                if expected_size.is_some() || last_modified.is_some() {
                    changes.push(ManifestChange {
                        key,
                        filename: filename.clone(),
                        size: expected_size,
                        etag: None,
                        last_modified,
                    });
                }
                continue;
            }
        }

        tasks.push(FetchTask {
            task_id: key,
            filename: filename.clone(),
            url: format!(
                "{}/{}{}",
                base_url,
                entry.remote_path.replace(' ', "%20"),
                urlencoding::encode(filename)
            ),
            destination: dest_directory.join(filename),
            expected_size,
            last_modified,
        });
    }

    events.emit(DownloadEvent::BatchStart {
        system: entry.key.to_string(),
        tasks: tasks.len(),
    });

    let controller = BackpressureController::with_jobs(options.profile, options.jobs);
    let extract_semaphore = Semaphore::new(EXTRACT_CONCURRENCY_CAP.min(options.jobs.max(1)));
    let results: Vec<TaskResult> = futures::stream::iter(tasks.into_iter().map(|task| {
        let controller = &controller;
        let extract_semaphore = &extract_semaphore;
        let dest_directory = &dest_directory;
        let events = events.clone();
        async move {
            process_task(
                client,
                entry,
                task,
                dest_directory,
                controller,
                extract_semaphore,
                options,
                events,
                cancellation,
            )
            .await
        }
    }))
    .buffer_unordered(options.jobs.max(1))
    .collect()
    .await;

    for result in results {
        match result {
            TaskResult::Success {
                bytes_downloaded,
                skipped,
                change,
            } => {
                if skipped {
                    summary.skipped += 1;
                } else {
                    summary.success += 1;
                }
                summary.bytes_downloaded += bytes_downloaded;
                if let Some(change) = change {
                    changes.push(change);
                }
            }
            TaskResult::Failure { task_id, message } => {
                summary.failed += 1;
                summary.failures.push((task_id, message));
            }
            TaskResult::Cancelled => (),
        }
    }

    summary.duration_ms = started.elapsed().as_millis() as u64;
    emit_batch_complete(events, &summary);
    Ok((summary, changes, directory_last_modified))
}

#[allow(clippy::too_many_arguments)]
async fn process_task(
    client: &reqwest::Client,
    entry: &SystemEntry,
    task: FetchTask,
    dest_directory: &Path,
    controller: &BackpressureController,
    extract_semaphore: &Semaphore,
    options: &DownloadOptions,
    events: EventSink<DownloadEvent>,
    cancellation: &CancellationToken,
) -> TaskResult {
    let estimate = task.expected_size.unwrap_or(DEFAULT_BYTES_ESTIMATE);
    if controller.acquire(estimate, cancellation).await.is_err() {
        return TaskResult::Cancelled;
    }

    events.emit(DownloadEvent::Start {
        task_id: task.task_id.clone(),
        filename: task.filename.clone(),
        size: task.expected_size,
    });

    let progress_events = events.clone();
    let progress_task_id = task.task_id.clone();
    let fetch_options = FetchOptions {
        retries: options.retries,
        delay: options.delay,
        quiet: true,
        verbose: false,
        headers: Vec::new(),
        on_progress: Some(Box::new(move |current, total, bytes_per_second| {
            progress_events.emit(DownloadEvent::Progress {
                task_id: progress_task_id.clone(),
                current,
                total,
                bytes_per_second,
            });
        })),
    };

    let outcome = fetch_file(
        client,
        &task.url,
        &task.destination,
        task.expected_size,
        &fetch_options,
        cancellation,
    )
    .await;
    controller.release(estimate, outcome.bytes_downloaded);

    if cancellation.is_cancelled() {
        return TaskResult::Cancelled;
    }
    if !outcome.success {
        let message = outcome
            .error
            .unwrap_or_else(|| String::from("Download failed"));
        events.emit(DownloadEvent::Error {
            task_id: task.task_id.clone(),
            message: message.clone(),
        });
        return TaskResult::Failure {
            task_id: task.task_id,
            message,
        };
    }

    if entry.extract && !outcome.skipped && is_archive(&task.destination) {
        let _permit = extract_semaphore.acquire().await.unwrap();
        if let Err(message) = extract_with_recovery(
            client,
            entry,
            &task,
            dest_directory,
            options,
            &events,
            cancellation,
        )
        .await
        {
            if cancellation.is_cancelled() {
                return TaskResult::Cancelled;
            }
            events.emit(DownloadEvent::ExtractError {
                task_id: task.task_id.clone(),
                message: message.clone(),
            });
            return TaskResult::Failure {
                task_id: task.task_id,
                message,
            };
        }
    }

    events.emit(DownloadEvent::Complete {
        task_id: task.task_id.clone(),
        bytes_downloaded: outcome.bytes_downloaded,
        skipped: outcome.skipped,
    });
    TaskResult::Success {
        bytes_downloaded: outcome.bytes_downloaded,
        skipped: outcome.skipped,
        change: Some(ManifestChange {
            key: task.task_id,
            filename: task.filename,
            size: task.expected_size,
            etag: None,
            last_modified: task.last_modified,
        }),
    }
}

/// Extract a fetched archive; on failure delete it, re-fetch once, and
/// extract again.
async fn extract_with_recovery(
    client: &reqwest::Client,
    entry: &SystemEntry,
    task: &FetchTask,
    dest_directory: &Path,
    options: &DownloadOptions,
    events: &EventSink<DownloadEvent>,
    cancellation: &CancellationToken,
) -> Result<(), String> {
    let extract_options = ExtractOptions {
        extract_glob: entry.extract_glob.map(String::from),
        delete_archive: true,
        flatten: true,
    };
    events.emit(DownloadEvent::ExtractStart {
        task_id: task.task_id.clone(),
        archive: task.filename.clone(),
    });

    match extract_zip(&task.destination, dest_directory, &extract_options).await {
        Ok(files) => {
            events.emit(DownloadEvent::ExtractComplete {
                task_id: task.task_id.clone(),
                files: files.len(),
            });
            return Ok(());
        }
        Err(error) => {
            debug!(
                "Extraction of \"{}\" failed, re-fetching: {}",
                task.filename, error
            );
        }
    }

    tokio::fs::remove_file(&task.destination).await.ok();
    let retry_options = FetchOptions {
        retries: options.retries,
        delay: options.delay,
        quiet: true,
        ..FetchOptions::default()
    };
    let outcome = fetch_file(
        client,
        &task.url,
        &task.destination,
        task.expected_size,
        &retry_options,
        cancellation,
    )
    .await;
    if !outcome.success {
        return Err(outcome
            .error
            .unwrap_or_else(|| String::from("Re-fetch failed")));
    }

    match extract_zip(&task.destination, dest_directory, &extract_options).await {
        Ok(files) => {
            events.emit(DownloadEvent::ExtractComplete {
                task_id: task.task_id.clone(),
                files: files.len(),
            });
            Ok(())
        }
        Err(error) => Err(error.to_string()),
    }
}

fn emit_batch_complete(events: &EventSink<DownloadEvent>, summary: &SystemSummary) {
    events.emit(DownloadEvent::BatchComplete {
        system: summary.system.clone(),
        success: summary.success,
        failed: summary.failed,
        skipped: summary.skipped,
        bytes_downloaded: summary.bytes_downloaded,
        duration_ms: summary.duration_ms,
    });
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|archive| archive.eq_ignore_ascii_case(extension))
        })
        .unwrap_or(false)
}

fn stem_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => filename.to_string(),
    }
}

/// Existing destination files, by exact name and by lowercased stem, so a
/// present archive or its extracted form both count.
fn read_existing(dest_directory: &Path) -> (HashSet<String>, HashSet<String>) {
    let mut names = HashSet::new();
    let mut stems = HashSet::new();
    if let Ok(entries) = std::fs::read_dir(dest_directory) {
        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".part") || name.ends_with(".tmp") || name.ends_with(".json") {
                continue;
            }
            stems.insert(stem_of(&name).to_lowercase());
            names.insert(name);
        }
    }
    (names, stems)
}

#[cfg(test)]
mod test_download_batch;
