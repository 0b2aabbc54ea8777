use super::SimpleResult;
use super::config::SystemEntry;
use super::database::*;
use super::events::{EventSink, SyncEvent};
use super::listing::{
    RemoteFile, fetch_directory_index, parse_directory_last_modified, parse_directory_listing,
};
use super::model::SyncStatus;
use super::name_parser::parse_rom_name;
use super::util::format_rfc3339;
use indicatif::ProgressBar;
use log::debug;
use regex::Regex;
use sqlx::sqlite::SqliteConnection;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

const ERROR_MESSAGE_LIMIT: usize = 255;

#[derive(Debug, Default, PartialEq)]
pub struct SyncOutcome {
    pub skipped: bool,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub remote_count: usize,
}

/// Mirror one remote directory listing into the catalog. All row changes for
/// the `(system, source)` pair happen in a single immediate transaction; on
/// error the transaction rolls back and the sync state records the failure.
pub async fn sync_system(
    connection: &mut SqliteConnection,
    progress_bar: &ProgressBar,
    client: &reqwest::Client,
    base_url: &str,
    entry: &SystemEntry,
    force: bool,
    events: &EventSink<SyncEvent>,
    cancellation: &CancellationToken,
) -> SimpleResult<SyncOutcome> {
    let source = entry.source.to_string();
    progress_bar.println(format!("Syncing \"{}\"", entry.label));

    let listing_url = format!("{}/{}", base_url, entry.remote_path.replace(' ', "%20"));
    let html = fetch_directory_index(client, &listing_url, cancellation).await?;

    let directory_last_modified =
        parse_directory_last_modified(&html).map(|timestamp| format_rfc3339(&timestamp));

    if !force {
        if let Some(state) = find_sync_state(connection, entry.key, &source).await {
            if state.status == SyncStatus::Synced.to_string()
                && directory_last_modified.is_some()
                && state.remote_last_modified == directory_last_modified
            {
                debug!("\"{}\" is unchanged, skipping", entry.label);
                events.emit(SyncEvent::Skip {
                    system: entry.key.to_string(),
                    source: source.clone(),
                });
                return Ok(SyncOutcome {
                    skipped: true,
                    ..SyncOutcome::default()
                });
            }
        }
    }

    let archive_pattern = try_with!(
        Regex::new(entry.archive_pattern),
        "Invalid archive pattern for \"{}\"",
        entry.key
    );
    let listing = parse_directory_listing(&html, &archive_pattern);

    upsert_sync_state(
        connection,
        entry.key,
        &source,
        directory_last_modified.as_deref(),
        0,
        SyncStatus::Syncing,
        None,
    )
    .await?;

    begin_immediate_transaction(connection).await?;
    match apply_listing(connection, entry.key, &source, &listing).await {
        Ok(mut outcome) => {
            outcome.remote_count = listing.len();
            upsert_sync_state(
                connection,
                entry.key,
                &source,
                directory_last_modified.as_deref(),
                listing.len() as i64,
                SyncStatus::Synced,
                None,
            )
            .await?;
            commit_transaction(connection).await?;
            events.emit(SyncEvent::Synced {
                system: entry.key.to_string(),
                source: source.clone(),
                inserted: outcome.inserted,
                updated: outcome.updated,
                deleted: outcome.deleted,
            });
            progress_bar.println(format!(
                "Synced \"{}\": {} inserted, {} updated, {} deleted",
                entry.label, outcome.inserted, outcome.updated, outcome.deleted
            ));
            Ok(outcome)
        }
        Err(error) => {
            rollback_transaction(connection).await;
            let message: String = error.to_string().chars().take(ERROR_MESSAGE_LIMIT).collect();
            upsert_sync_state(
                connection,
                entry.key,
                &source,
                None,
                0,
                SyncStatus::Error,
                Some(&message),
            )
            .await?;
            events.emit(SyncEvent::Error {
                system: entry.key.to_string(),
                source,
                message: message.clone(),
            });
            Err(error)
        }
    }
}

/// Diff the remote listing against the stored rows: insert what is new,
/// update what changed, delete what the remote dropped.
async fn apply_listing(
    connection: &mut SqliteConnection,
    system: &str,
    source: &str,
    listing: &[RemoteFile],
) -> SimpleResult<SyncOutcome> {
    let mut existing: HashMap<String, (i64, Option<i64>, Option<String>)> =
        find_remote_roms_by_system_and_source(connection, system, source)
            .await
            .into_iter()
            .map(|rom| (rom.filename.clone(), (rom.id, rom.size, rom.last_modified)))
            .collect();

    let mut outcome = SyncOutcome::default();
    for remote_file in listing {
        let size = remote_file.size.map(|size| size as i64);
        let last_modified = remote_file
            .last_modified
            .map(|timestamp| format_rfc3339(&timestamp));
        match existing.remove(&remote_file.filename) {
            None => {
                let id = create_remote_rom(
                    connection,
                    system,
                    source,
                    &remote_file.filename,
                    size,
                    last_modified.as_deref(),
                )
                .await?;
                upsert_rom_metadata(connection, id, &parse_rom_name(&remote_file.filename))
                    .await?;
                outcome.inserted += 1;
            }
            Some((id, stored_size, stored_last_modified)) => {
                if stored_size != size || stored_last_modified != last_modified {
                    update_remote_rom(connection, id, size, last_modified.as_deref()).await?;
                    upsert_rom_metadata(connection, id, &parse_rom_name(&remote_file.filename))
                        .await?;
                    outcome.updated += 1;
                }
            }
        }
    }

    let stale_ids: Vec<i64> = existing.values().map(|(id, _, _)| *id).collect();
    if !stale_ids.is_empty() {
        delete_remote_roms_by_ids(connection, &stale_ids).await?;
        outcome.deleted = stale_ids.len();
    }

    Ok(outcome)
}
