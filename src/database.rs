use super::SimpleResult;
use super::model::*;
use super::name_parser::{RomRecord, parenthesized_tokens};
use super::util::utc_now_rfc3339;
use itertools::Itertools;
use sqlx::migrate::Migrator;
use sqlx::prelude::*;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

static MIGRATOR: Migrator = sqlx::migrate!();

/// A delete batch never exceeds this many bind parameters.
pub const DELETE_BATCH_SIZE: usize = 500;

pub async fn establish_connection(url: &str) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
        .unwrap_or_else(|_| panic!("Error connecting to {}", url));

    pool.execute(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
        ",
    )
    .await
    .expect("Failed to setup the database");

    MIGRATOR
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    pool
}

pub async fn close_connection(pool: &SqlitePool) {
    pool.execute(
        "
        PRAGMA optimize;
        PRAGMA wal_checkpoint(truncate);
        ",
    )
    .await
    .expect("Failed to optimize the database");
}

/// Sync writes run under BEGIN IMMEDIATE so the write lock is taken up
/// front instead of at the first write.
pub async fn begin_immediate_transaction(connection: &mut SqliteConnection) -> SimpleResult<()> {
    try_with!(
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *connection).await,
        "Failed to begin transaction"
    );
    Ok(())
}

pub async fn commit_transaction(connection: &mut SqliteConnection) -> SimpleResult<()> {
    try_with!(
        sqlx::query("COMMIT").execute(&mut *connection).await,
        "Failed to commit transaction"
    );
    Ok(())
}

pub async fn rollback_transaction(connection: &mut SqliteConnection) {
    sqlx::query("ROLLBACK")
        .execute(connection)
        .await
        .expect("Failed to rollback transaction");
}

pub async fn create_remote_rom(
    connection: &mut SqliteConnection,
    system: &str,
    source: &str,
    filename: &str,
    size: Option<i64>,
    last_modified: Option<&str>,
) -> SimpleResult<i64> {
    let id = try_with!(
        sqlx::query(
            "
            INSERT INTO remote_roms (system, source, filename, size, last_modified, last_synced_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(system)
        .bind(source)
        .bind(filename)
        .bind(size)
        .bind(last_modified)
        .bind(utc_now_rfc3339())
        .execute(connection)
        .await,
        "Error while creating remote rom \"{}\"",
        filename
    )
    .last_insert_rowid();
    Ok(id)
}

pub async fn update_remote_rom(
    connection: &mut SqliteConnection,
    id: i64,
    size: Option<i64>,
    last_modified: Option<&str>,
) -> SimpleResult<()> {
    try_with!(
        sqlx::query(
            "
            UPDATE remote_roms
            SET size = ?, last_modified = ?, last_synced_at = ?
            WHERE id = ?
            ",
        )
        .bind(size)
        .bind(last_modified)
        .bind(utc_now_rfc3339())
        .bind(id)
        .execute(connection)
        .await,
        "Error while updating remote rom with id {}",
        id
    );
    Ok(())
}

pub async fn find_remote_roms_by_system_and_source(
    connection: &mut SqliteConnection,
    system: &str,
    source: &str,
) -> Vec<RemoteRom> {
    sqlx::query_as::<_, RemoteRom>(
        "
        SELECT *
        FROM remote_roms
        WHERE system = ?
        AND source = ?
        ORDER BY filename
        ",
    )
    .bind(system)
    .bind(source)
    .fetch_all(connection)
    .await
    .expect("Error while finding remote roms")
}

pub async fn count_remote_roms_by_system_and_source(
    connection: &mut SqliteConnection,
    system: &str,
    source: &str,
) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "
        SELECT COUNT(id)
        FROM remote_roms
        WHERE system = ?
        AND source = ?
        ",
    )
    .bind(system)
    .bind(source)
    .fetch_one(connection)
    .await
    .expect("Error while counting remote roms")
}

/// Cascading deletes remove the attached metadata rows.
pub async fn delete_remote_roms_by_ids(
    connection: &mut SqliteConnection,
    ids: &[i64],
) -> SimpleResult<()> {
    for chunk in ids.chunks(DELETE_BATCH_SIZE) {
        let placeholders = chunk.iter().map(|_| "?").join(", ");
        let sql = format!("DELETE FROM remote_roms WHERE id IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for id in chunk {
            query = query.bind(id);
        }
        try_with!(
            query.execute(&mut *connection).await,
            "Error while deleting remote roms"
        );
    }
    Ok(())
}

pub async fn upsert_rom_metadata(
    connection: &mut SqliteConnection,
    remote_rom_id: i64,
    record: &RomRecord,
) -> SimpleResult<()> {
    let regions = serde_json::to_string(&record.region_codes).unwrap();
    let languages = serde_json::to_string(&record.languages).unwrap();
    // RomRecord folds release-status keywords into one prerelease flag, the
    // catalog keeps them apart
    let tokens = parenthesized_tokens(&record.base_name);
    let has = |keyword: &str| tokens.iter().any(|token| token == keyword);
    let is_beta = has("beta") || tokens.iter().any(|token| token.starts_with("beta "));
    let is_demo = has("demo");
    let is_proto = has("proto") || has("prototype");
    let is_sample = has("sample") || has("preview");
    let is_virtual = has("virtual console");
    let is_compilation = has("compilation");
    try_with!(
        sqlx::query(
            "
            INSERT INTO rom_metadata (
                remote_rom_id, title, regions, languages, revision,
                is_beta, is_demo, is_proto, is_sample,
                is_unlicensed, is_homebrew, is_hack, is_virtual, is_compilation
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (remote_rom_id) DO UPDATE SET
                title = excluded.title,
                regions = excluded.regions,
                languages = excluded.languages,
                revision = excluded.revision,
                is_beta = excluded.is_beta,
                is_demo = excluded.is_demo,
                is_proto = excluded.is_proto,
                is_sample = excluded.is_sample,
                is_unlicensed = excluded.is_unlicensed,
                is_homebrew = excluded.is_homebrew,
                is_hack = excluded.is_hack,
                is_virtual = excluded.is_virtual,
                is_compilation = excluded.is_compilation
            ",
        )
        .bind(remote_rom_id)
        .bind(&record.title)
        .bind(regions)
        .bind(languages)
        .bind(&record.version)
        .bind(is_beta)
        .bind(is_demo)
        .bind(is_proto)
        .bind(is_sample)
        .bind(record.flags.unlicensed)
        .bind(record.flags.homebrew)
        .bind(record.flags.hack)
        .bind(is_virtual)
        .bind(is_compilation)
        .execute(connection)
        .await,
        "Error while upserting metadata for remote rom {}",
        remote_rom_id
    );
    Ok(())
}

pub async fn find_rom_metadata_by_remote_rom_id(
    connection: &mut SqliteConnection,
    remote_rom_id: i64,
) -> Option<RomMetadata> {
    sqlx::query_as::<_, RomMetadata>(
        "
        SELECT *
        FROM rom_metadata
        WHERE remote_rom_id = ?
        ",
    )
    .bind(remote_rom_id)
    .fetch_optional(connection)
    .await
    .expect("Error while finding rom metadata")
}

pub async fn find_sync_state(
    connection: &mut SqliteConnection,
    system: &str,
    source: &str,
) -> Option<SyncState> {
    sqlx::query_as::<_, SyncState>(
        "
        SELECT *
        FROM sync_state
        WHERE system = ?
        AND source = ?
        ",
    )
    .bind(system)
    .bind(source)
    .fetch_optional(connection)
    .await
    .expect("Error while finding sync state")
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert_sync_state(
    connection: &mut SqliteConnection,
    system: &str,
    source: &str,
    remote_last_modified: Option<&str>,
    remote_count: i64,
    status: SyncStatus,
    last_error: Option<&str>,
) -> SimpleResult<()> {
    try_with!(
        sqlx::query(
            "
            INSERT INTO sync_state (
                system, source, remote_last_modified, local_last_synced,
                remote_count, status, last_error
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (system, source) DO UPDATE SET
                remote_last_modified = excluded.remote_last_modified,
                local_last_synced = excluded.local_last_synced,
                remote_count = excluded.remote_count,
                status = excluded.status,
                last_error = excluded.last_error
            ",
        )
        .bind(system)
        .bind(source)
        .bind(remote_last_modified)
        .bind(utc_now_rfc3339())
        .bind(remote_count)
        .bind(status.to_string())
        .bind(last_error)
        .execute(connection)
        .await,
        "Error while upserting sync state for \"{}\"",
        system
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert_local_rom(
    connection: &mut SqliteConnection,
    local_path: &str,
    system: &str,
    filename: &str,
    base_name: &str,
    file_size: i64,
    sha1: Option<&str>,
    crc32: Option<&str>,
) -> SimpleResult<()> {
    try_with!(
        sqlx::query(
            "
            INSERT INTO local_roms (
                local_path, system, filename, base_name, file_size, sha1, crc32, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (local_path) DO UPDATE SET
                system = excluded.system,
                filename = excluded.filename,
                base_name = excluded.base_name,
                file_size = excluded.file_size,
                sha1 = excluded.sha1,
                crc32 = excluded.crc32,
                updated_at = excluded.updated_at
            ",
        )
        .bind(local_path)
        .bind(system)
        .bind(filename)
        .bind(base_name)
        .bind(file_size)
        .bind(sha1)
        .bind(crc32)
        .bind(utc_now_rfc3339())
        .execute(connection)
        .await,
        "Error while upserting local rom \"{}\"",
        local_path
    );
    Ok(())
}

pub async fn find_local_roms_by_path_prefix(
    connection: &mut SqliteConnection,
    prefix: &str,
) -> Vec<LocalRom> {
    sqlx::query_as::<_, LocalRom>(
        "
        SELECT *
        FROM local_roms
        WHERE local_path LIKE ? || '%'
        ORDER BY local_path
        ",
    )
    .bind(prefix)
    .fetch_all(connection)
    .await
    .expect("Error while finding local roms")
}

pub async fn find_local_roms_by_system(
    connection: &mut SqliteConnection,
    system: &str,
) -> Vec<LocalRom> {
    sqlx::query_as::<_, LocalRom>(
        "
        SELECT *
        FROM local_roms
        WHERE system = ?
        ORDER BY local_path
        ",
    )
    .bind(system)
    .fetch_all(connection)
    .await
    .expect("Error while finding local roms")
}

pub async fn delete_local_roms_by_paths(
    connection: &mut SqliteConnection,
    paths: &[String],
) -> SimpleResult<()> {
    for chunk in paths.chunks(DELETE_BATCH_SIZE) {
        let placeholders = chunk.iter().map(|_| "?").join(", ");
        let sql = format!("DELETE FROM local_roms WHERE local_path IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for path in chunk {
            query = query.bind(path);
        }
        try_with!(
            query.execute(&mut *connection).await,
            "Error while deleting local roms"
        );
    }
    Ok(())
}

pub async fn find_scraper_cache_entry(
    connection: &mut SqliteConnection,
    cache_key: &str,
) -> Option<ScraperCacheEntry> {
    sqlx::query_as::<_, ScraperCacheEntry>(
        "
        SELECT *
        FROM scraper_cache
        WHERE cache_key = ?
        ",
    )
    .bind(cache_key)
    .fetch_optional(connection)
    .await
    .expect("Error while finding scraper cache entry")
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert_scraper_cache_entry(
    connection: &mut SqliteConnection,
    cache_key: &str,
    game_id: Option<i64>,
    game_name: Option<&str>,
    media_urls: &str,
    raw_response: Option<&str>,
    scraped_at: &str,
    expires_at: &str,
) -> SimpleResult<()> {
    try_with!(
        sqlx::query(
            "
            INSERT INTO scraper_cache (
                cache_key, game_id, game_name, media_urls, raw_response, scraped_at, expires_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (cache_key) DO UPDATE SET
                game_id = excluded.game_id,
                game_name = excluded.game_name,
                media_urls = excluded.media_urls,
                raw_response = excluded.raw_response,
                scraped_at = excluded.scraped_at,
                expires_at = excluded.expires_at
            ",
        )
        .bind(cache_key)
        .bind(game_id)
        .bind(game_name)
        .bind(media_urls)
        .bind(raw_response)
        .bind(scraped_at)
        .bind(expires_at)
        .execute(connection)
        .await,
        "Error while upserting scraper cache entry \"{}\"",
        cache_key
    );
    Ok(())
}

/// Legacy JSON cache migration inserts keep existing rows untouched.
#[allow(clippy::too_many_arguments)]
pub async fn insert_scraper_cache_entry_ignore(
    connection: &mut SqliteConnection,
    cache_key: &str,
    game_id: Option<i64>,
    game_name: Option<&str>,
    media_urls: &str,
    raw_response: Option<&str>,
    scraped_at: &str,
    expires_at: &str,
) -> SimpleResult<()> {
    try_with!(
        sqlx::query(
            "
            INSERT INTO scraper_cache (
                cache_key, game_id, game_name, media_urls, raw_response, scraped_at, expires_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (cache_key) DO NOTHING
            ",
        )
        .bind(cache_key)
        .bind(game_id)
        .bind(game_name)
        .bind(media_urls)
        .bind(raw_response)
        .bind(scraped_at)
        .bind(expires_at)
        .execute(connection)
        .await,
        "Error while inserting scraper cache entry \"{}\"",
        cache_key
    );
    Ok(())
}

pub async fn delete_expired_scraper_cache_entries(
    connection: &mut SqliteConnection,
    now: &str,
) -> SimpleResult<u64> {
    let result = try_with!(
        sqlx::query("DELETE FROM scraper_cache WHERE expires_at < ?")
            .bind(now)
            .execute(connection)
            .await,
        "Error while deleting expired scraper cache entries"
    );
    Ok(result.rows_affected())
}

#[derive(Debug, Default)]
pub struct SearchQuery {
    pub query: String,
    pub systems: Vec<String>,
    pub regions: Vec<String>,
    pub local_only: bool,
    pub exclude_prerelease: bool,
    pub limit: i64,
    pub offset: i64,
}

/// Search the catalog joining remote listings, parsed metadata and local
/// presence. Satisfied entirely from SQLite.
pub async fn search_roms(
    connection: &mut SqliteConnection,
    search: &SearchQuery,
) -> Vec<SearchHit> {
    let mut sql = String::from(
        "
        SELECT rr.system, rr.source, rr.filename, rm.title, rm.regions, lr.local_path
        FROM remote_roms rr
        JOIN rom_metadata rm ON rm.remote_rom_id = rr.id
        LEFT JOIN local_roms lr ON lr.system = rr.system
            AND (lr.filename = rr.filename
                OR lr.base_name = substr(rr.filename, 1, length(rr.filename) - 4))
        WHERE 1 = 1
        ",
    );
    if !search.query.is_empty() {
        sql.push_str(" AND (rm.title LIKE '%' || ? || '%' OR rr.filename LIKE '%' || ? || '%')");
    }
    if !search.systems.is_empty() {
        sql.push_str(&format!(
            " AND rr.system IN ({})",
            search.systems.iter().map(|_| "?").join(", ")
        ));
    }
    if !search.regions.is_empty() {
        let clauses = search
            .regions
            .iter()
            .map(|_| "rm.regions LIKE '%\"' || ? || '\"%'")
            .join(" OR ");
        sql.push_str(&format!(" AND ({})", clauses));
    }
    if search.local_only {
        sql.push_str(" AND lr.local_path IS NOT NULL");
    }
    if search.exclude_prerelease {
        sql.push_str(" AND NOT (rm.is_beta OR rm.is_demo OR rm.is_proto OR rm.is_sample)");
    }
    sql.push_str(" ORDER BY rm.title, rr.filename LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, SearchHit>(&sql);
    if !search.query.is_empty() {
        query = query.bind(&search.query).bind(&search.query);
    }
    for system in &search.systems {
        query = query.bind(system);
    }
    for region in &search.regions {
        query = query.bind(region);
    }
    let limit = if search.limit > 0 { search.limit } else { 50 };
    query = query.bind(limit).bind(search.offset);

    query
        .fetch_all(connection)
        .await
        .expect("Error while searching roms")
}

#[cfg(test)]
mod test_search;
