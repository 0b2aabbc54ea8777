use serde::Deserialize;
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
pub enum CatalogSource {
    #[strum(serialize = "no-intro")]
    NoIntro,
    #[strum(serialize = "redump")]
    Redump,
}

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Stale,
    Syncing,
    Error,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RemoteRom {
    pub id: i64,
    pub system: String,
    pub source: String,
    pub filename: String,
    pub size: Option<i64>,
    pub last_modified: Option<String>,
    pub last_synced_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RomMetadata {
    pub id: i64,
    pub remote_rom_id: i64,
    pub title: String,
    pub regions: String,
    pub languages: String,
    pub revision: Option<String>,
    pub is_beta: bool,
    pub is_demo: bool,
    pub is_proto: bool,
    pub is_sample: bool,
    pub is_unlicensed: bool,
    pub is_homebrew: bool,
    pub is_hack: bool,
    pub is_virtual: bool,
    pub is_compilation: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncState {
    pub id: i64,
    pub system: String,
    pub source: String,
    pub remote_last_modified: Option<String>,
    pub local_last_synced: String,
    pub remote_count: i64,
    pub status: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LocalRom {
    pub local_path: String,
    pub system: String,
    pub filename: String,
    pub base_name: String,
    pub file_size: i64,
    pub sha1: Option<String>,
    pub crc32: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScraperCacheEntry {
    pub cache_key: String,
    pub game_id: Option<i64>,
    pub game_name: Option<String>,
    pub media_urls: String,
    pub raw_response: Option<String>,
    pub scraped_at: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchHit {
    pub system: String,
    pub source: String,
    pub filename: String,
    pub title: String,
    pub regions: String,
    pub local_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserInfosJson {
    pub response: UserInfosResponseJson,
}

#[derive(Debug, Deserialize)]
pub struct UserInfosResponseJson {
    pub ssuser: SsUserJson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SsUserJson {
    pub id: Option<String>,
    pub maxthreads: Option<String>,
    pub maxdownloadspeed: Option<String>,
}

impl SsUserJson {
    pub fn max_threads(&self) -> Option<usize> {
        self.maxthreads.as_deref().and_then(|t| t.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
pub struct JeuInfosJson {
    pub response: JeuInfosResponseJson,
}

#[derive(Debug, Deserialize)]
pub struct JeuInfosResponseJson {
    pub jeu: JeuJson,
    pub ssuser: Option<SsUserJson>,
}

#[derive(Debug, Deserialize)]
pub struct JeuJson {
    pub id: String,
    #[serde(default)]
    pub noms: Vec<NomJson>,
    pub region: Option<String>,
    #[serde(default)]
    pub medias: Vec<MediaJson>,
}

#[derive(Debug, Deserialize)]
pub struct NomJson {
    pub region: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaJson {
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    pub format: Option<String>,
    pub region: Option<String>,
}
