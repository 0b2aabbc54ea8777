use super::SimpleResult;
use super::checksum::get_file_hashes;
use super::config::*;
use super::database::*;
use super::progress::*;
use super::sidecar::write_sidecar;
use super::util::glob_match;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub scanned: usize,
    pub pruned: usize,
    pub missing_bios: Vec<(String, String)>,
}

struct ScannedFile {
    local_path: String,
    system: String,
    filename: String,
    base_name: String,
    size: u64,
    sha1: Option<String>,
    crc32: Option<String>,
}

/// Walk the ROM root, hash what is found, write metadata sidecars, and
/// reconcile `local_roms` so that downloaded status stays accurate after
/// manual deletions.
pub async fn scan_roms(
    connection: &mut sqlx::sqlite::SqliteConnection,
    progress_bar: &ProgressBar,
    target_directory: &Path,
    hash: bool,
    cancellation: &CancellationToken,
) -> SimpleResult<ScanOutcome> {
    let roms_directory = target_directory.join(ROMS_DIRECTORY);
    let mut outcome = ScanOutcome::default();

    for entry in &SYSTEM_ENTRIES {
        if cancellation.is_cancelled() {
            bail!("Cancelled");
        }

        let system_directory = roms_directory.join(entry.dest_directory);
        let files = collect_rom_files(&system_directory);

        progress_bar.reset();
        progress_bar.set_style(get_count_progress_style());
        progress_bar.set_length(files.len() as u64);
        progress_bar.set_message(format!("Scanning \"{}\"", entry.label));

        let scanned = hash_files(progress_bar, entry.key, &roms_directory, files, hash);

        let mut seen: HashSet<String> = HashSet::with_capacity(scanned.len());
        for file in &scanned {
            if cancellation.is_cancelled() {
                bail!("Cancelled");
            }
            seen.insert(file.local_path.clone());
            upsert_local_rom(
                connection,
                &file.local_path,
                &file.system,
                &file.filename,
                &file.base_name,
                file.size as i64,
                file.sha1.as_deref(),
                file.crc32.as_deref(),
            )
            .await?;
            let rom_path = target_directory.join(&file.local_path);
            write_sidecar(
                &rom_path,
                file.size,
                file.sha1.as_deref(),
                file.crc32.as_deref(),
            )
            .await?;
        }
        outcome.scanned += scanned.len();

        // prune rows whose file no longer exists, scoped to this system
        let prefix = format!("{}/{}/", ROMS_DIRECTORY, entry.dest_directory);
        let stale: Vec<String> = find_local_roms_by_path_prefix(connection, &prefix)
            .await
            .into_iter()
            .map(|rom| rom.local_path)
            .filter(|path| !seen.contains(path))
            .collect();
        if !stale.is_empty() {
            delete_local_roms_by_paths(connection, &stale).await?;
            outcome.pruned += stale.len();
        }

        for bios_filename in entry.bios_filenames {
            let bios_path = target_directory
                .join(BIOS_DIRECTORY)
                .join(entry.key)
                .join(bios_filename);
            if !bios_path.is_file() {
                outcome
                    .missing_bios
                    .push((entry.key.to_string(), bios_filename.to_string()));
            }
        }
    }

    progress_bar.set_message("");
    progress_bar.set_style(get_none_progress_style());
    Ok(outcome)
}

fn collect_rom_files(system_directory: &Path) -> Vec<PathBuf> {
    if !system_directory.is_dir() {
        return Vec::new();
    }
    WalkDir::new(system_directory)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            // artwork lives under media/ and is not a ROM
            !entry
                .path()
                .components()
                .any(|component| component.as_os_str() == MEDIA_DIRECTORY)
        })
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            let extension = name.rsplit('.').next().unwrap_or_default().to_lowercase();
            !name.starts_with('.')
                && !glob_match("*.part", &name)
                && !glob_match("*.tmp", &name)
                && extension != JSON_EXTENSION
                && (ROM_EXTENSIONS.contains(&extension.as_str())
                    || ARCHIVE_EXTENSIONS.contains(&extension.as_str()))
        })
        .map(|entry| entry.into_path())
        .collect()
}

fn hash_files(
    progress_bar: &ProgressBar,
    system: &str,
    roms_directory: &Path,
    files: Vec<PathBuf>,
    hash: bool,
) -> Vec<ScannedFile> {
    let target_directory = roms_directory.parent().unwrap_or(roms_directory);
    files
        .par_iter()
        .filter_map(|path| {
            let hidden = ProgressBar::hidden();
            let filename = path.file_name()?.to_string_lossy().into_owned();
            let base_name = match filename.rsplit_once('.') {
                Some((base, _)) => base.to_string(),
                None => filename.clone(),
            };
            let local_path = path
                .strip_prefix(target_directory)
                .ok()?
                .to_string_lossy()
                .replace('\\', "/");
            let result = if hash {
                match get_file_hashes(&hidden, path, 1, 1) {
                    Ok(hashes) => Some(ScannedFile {
                        local_path,
                        system: system.to_string(),
                        filename,
                        base_name,
                        size: hashes.size,
                        sha1: Some(hashes.sha1),
                        crc32: Some(hashes.crc32),
                    }),
                    Err(_) => None,
                }
            } else {
                let size = std::fs::metadata(path).ok()?.len();
                Some(ScannedFile {
                    local_path,
                    system: system.to_string(),
                    filename,
                    base_name,
                    size,
                    sha1: None,
                    crc32: None,
                })
            };
            progress_bar.inc(1);
            result
        })
        .collect()
}
