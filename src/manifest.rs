use super::SimpleResult;
use super::config::{MANIFEST_FILENAME, ROMS_DIRECTORY};
use super::util::{utc_now_rfc3339, write_file_atomically};
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_VERSION: u32 = 1;

/// Per destination file record used to drive update decisions without
/// re-downloading. Keys are `<destDir>/<filename>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    #[serde(default)]
    pub entries: IndexMap<String, ManifestEntry>,
    #[serde(default)]
    pub directories: IndexMap<String, DirectoryState>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: IndexMap::new(),
            directories: IndexMap::new(),
        }
    }
}

impl Manifest {
    pub fn record_file(
        &mut self,
        key: &str,
        filename: &str,
        size: Option<u64>,
        etag: Option<String>,
        last_modified: Option<String>,
    ) {
        self.entries.insert(
            key.to_string(),
            ManifestEntry {
                filename: filename.to_string(),
                size,
                etag,
                last_modified,
                updated_at: utc_now_rfc3339(),
            },
        );
    }

    pub fn record_directory(&mut self, system_key: &str, last_modified: Option<String>) {
        self.directories.insert(
            system_key.to_string(),
            DirectoryState {
                last_modified,
                updated_at: utc_now_rfc3339(),
            },
        );
    }

    pub fn is_file_current(
        &self,
        key: &str,
        size: Option<u64>,
        last_modified: Option<&str>,
    ) -> bool {
        match self.entries.get(key) {
            Some(entry) => {
                let size_matches = match (entry.size, size) {
                    (Some(stored), Some(remote)) => stored == remote,
                    _ => true,
                };
                let timestamp_matches = match (entry.last_modified.as_deref(), last_modified) {
                    (Some(stored), Some(remote)) => stored == remote,
                    _ => true,
                };
                size_matches && timestamp_matches
            }
            None => false,
        }
    }

    pub fn is_directory_current(&self, system_key: &str, last_modified: Option<&str>) -> bool {
        match (self.directories.get(system_key), last_modified) {
            (Some(state), Some(remote)) => state.last_modified.as_deref() == Some(remote),
            _ => false,
        }
    }
}

pub fn manifest_path(target_directory: &Path) -> PathBuf {
    target_directory.join(ROMS_DIRECTORY).join(MANIFEST_FILENAME)
}

/// A missing or corrupt manifest reads as empty.
pub async fn load_manifest(target_directory: &Path) -> Manifest {
    let path = manifest_path(target_directory);
    match tokio::fs::read(&path).await {
        Ok(contents) => match serde_json::from_slice(&contents) {
            Ok(manifest) => manifest,
            Err(error) => {
                warn!("Ignoring corrupt manifest {:?}: {}", path, error);
                Manifest::default()
            }
        },
        Err(_) => Manifest::default(),
    }
}

/// Single writer, written atomically at the end of an engine run.
pub async fn save_manifest(target_directory: &Path, manifest: &Manifest) -> SimpleResult<()> {
    let path = manifest_path(target_directory);
    if let Some(parent) = path.parent() {
        try_with!(
            tokio::fs::create_dir_all(parent).await,
            "Failed to create {:?}",
            parent
        );
    }
    let contents = try_with!(
        serde_json::to_vec_pretty(manifest),
        "Failed to serialize manifest"
    );
    write_file_atomically(&path, &contents).await
}
