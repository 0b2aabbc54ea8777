use super::SimpleResult;
use super::name_parser::{DiscInfo, RomFlags, RomRecord, parse_rom_name};
use super::util::{utc_now_rfc3339, write_file_atomically};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-ROM metadata record written next to the file as `<romBase>.json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Sidecar {
    pub filename: String,
    pub title: String,
    pub regions: Vec<String>,
    pub region_codes: Vec<String>,
    pub languages: Vec<String>,
    pub version: Option<String>,
    pub disc: Option<DiscInfo>,
    pub tags: Vec<String>,
    pub flags: RomFlags,
    pub size: u64,
    pub sha1: Option<String>,
    pub crc32: Option<String>,
    pub scanned_at: String,
}

pub fn sidecar_path(rom_path: &Path) -> PathBuf {
    rom_path.with_extension("json")
}

pub async fn write_sidecar(
    rom_path: &Path,
    size: u64,
    sha1: Option<&str>,
    crc32: Option<&str>,
) -> SimpleResult<PathBuf> {
    let filename = rom_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let record: RomRecord = parse_rom_name(&filename);
    let sidecar = Sidecar {
        filename,
        title: record.title,
        regions: record.regions,
        region_codes: record.region_codes,
        languages: record.languages,
        version: record.version,
        disc: record.disc,
        tags: record.tags,
        flags: record.flags,
        size,
        sha1: sha1.map(String::from),
        crc32: crc32.map(String::from),
        scanned_at: utc_now_rfc3339(),
    };
    let path = sidecar_path(rom_path);
    let contents = try_with!(
        serde_json::to_vec_pretty(&sidecar),
        "Failed to serialize sidecar for {:?}",
        rom_path
    );
    write_file_atomically(&path, &contents).await?;
    Ok(path)
}

pub async fn read_sidecar(path: &Path) -> Option<Sidecar> {
    let contents = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&contents).ok()
}
