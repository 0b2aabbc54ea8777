use super::SimpleResult;
use super::model::CatalogSource;
use async_once_cell::OnceCell;
use phf::phf_map;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

static ROM_CLIENT: OnceCell<reqwest::Client> = OnceCell::new();
static MEDIA_CLIENT: OnceCell<reqwest::Client> = OnceCell::new();

/// Keep-alive pool for catalog listings and ROM downloads.
pub async fn get_rom_client() -> &'static reqwest::Client {
    ROM_CLIENT
        .get_or_init(async {
            reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(300))
                .build()
                .expect("Failed to build HTTP client")
        })
        .await
}

/// Separate pool for scraper media downloads.
pub async fn get_media_client() -> &'static reqwest::Client {
    MEDIA_CLIENT
        .get_or_init(async {
            reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client")
        })
        .await
}

pub static ZIP_EXTENSION: &str = "zip";
pub static SEVENZIP_EXTENSION: &str = "7z";
pub static JSON_EXTENSION: &str = "json";

pub static ARCHIVE_EXTENSIONS: [&str; 2] = [ZIP_EXTENSION, SEVENZIP_EXTENSION];

pub static ROM_EXTENSIONS: [&str; 13] = [
    "nes", "gb", "gba", "gbc", "md", "pce", "min", "sfc", "chd", "bin", "cue", "iso", "sms",
];

pub static ROMS_DIRECTORY: &str = "Roms";
pub static BIOS_DIRECTORY: &str = "Bios";
pub static MEDIA_DIRECTORY: &str = "media";
pub static MANIFEST_FILENAME: &str = ".retrosd-manifest.json";
pub static DATABASE_FILENAME: &str = ".retrosd.db";

pub static NOINTRO_BASE_URL: &str = "https://myrient.erista.me/files/No-Intro";
pub static REDUMP_BASE_URL: &str = "https://myrient.erista.me/files/Redump";

/// ScreenScraper `systemeid` values for the systems we mirror.
pub static SCREENSCRAPER_SYSTEM_IDS: phf::Map<&str, u32> = phf_map! {
    "md" => 1,
    "nes" => 3,
    "snes" => 4,
    "gb" => 9,
    "gbc" => 10,
    "gba" => 12,
    "pce" => 31,
    "psx" => 57,
};

/// One row per mirrored catalog directory. The set is fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemEntry {
    pub key: &'static str,
    pub source: CatalogSource,
    pub remote_path: &'static str,
    pub archive_pattern: &'static str,
    pub extract_glob: Option<&'static str>,
    pub dest_directory: &'static str,
    pub extract: bool,
    pub label: &'static str,
    pub bios_filenames: &'static [&'static str],
}

pub static SYSTEM_ENTRIES: [SystemEntry; 8] = [
    SystemEntry {
        key: "gb",
        source: CatalogSource::NoIntro,
        remote_path: "Nintendo - Game Boy/",
        archive_pattern: r"\.zip$",
        extract_glob: Some("*.gb"),
        dest_directory: "GB",
        extract: true,
        label: "Nintendo - Game Boy",
        bios_filenames: &[],
    },
    SystemEntry {
        key: "gbc",
        source: CatalogSource::NoIntro,
        remote_path: "Nintendo - Game Boy Color/",
        archive_pattern: r"\.zip$",
        extract_glob: Some("*.gbc"),
        dest_directory: "GBC",
        extract: true,
        label: "Nintendo - Game Boy Color",
        bios_filenames: &[],
    },
    SystemEntry {
        key: "gba",
        source: CatalogSource::NoIntro,
        remote_path: "Nintendo - Game Boy Advance/",
        archive_pattern: r"\.zip$",
        extract_glob: Some("*.gba"),
        dest_directory: "GBA",
        extract: true,
        label: "Nintendo - Game Boy Advance",
        bios_filenames: &["gba_bios.bin"],
    },
    SystemEntry {
        key: "nes",
        source: CatalogSource::NoIntro,
        remote_path: "Nintendo - Nintendo Entertainment System (Headered)/",
        archive_pattern: r"\.zip$",
        extract_glob: Some("*.nes"),
        dest_directory: "NES",
        extract: true,
        label: "Nintendo - Nintendo Entertainment System",
        bios_filenames: &["disksys.rom"],
    },
    SystemEntry {
        key: "snes",
        source: CatalogSource::NoIntro,
        remote_path: "Nintendo - Super Nintendo Entertainment System/",
        archive_pattern: r"\.zip$",
        extract_glob: Some("*.sfc"),
        dest_directory: "SNES",
        extract: true,
        label: "Nintendo - Super Nintendo Entertainment System",
        bios_filenames: &[],
    },
    SystemEntry {
        key: "md",
        source: CatalogSource::NoIntro,
        remote_path: "Sega - Mega Drive - Genesis/",
        archive_pattern: r"\.zip$",
        extract_glob: Some("*.md"),
        dest_directory: "MD",
        extract: true,
        label: "Sega - Mega Drive - Genesis",
        bios_filenames: &[],
    },
    SystemEntry {
        key: "pce",
        source: CatalogSource::NoIntro,
        remote_path: "NEC - PC Engine - TurboGrafx-16/",
        archive_pattern: r"\.zip$",
        extract_glob: Some("*.pce"),
        dest_directory: "PCE",
        extract: true,
        label: "NEC - PC Engine - TurboGrafx-16",
        bios_filenames: &["syscard3.pce"],
    },
    SystemEntry {
        key: "psx",
        source: CatalogSource::Redump,
        remote_path: "Sony - PlayStation/",
        archive_pattern: r"\.zip$",
        extract_glob: None,
        dest_directory: "PSX",
        extract: false,
        label: "Sony - PlayStation",
        bios_filenames: &["scph5501.bin", "scph5502.bin", "scph7001.bin"],
    },
];

pub fn find_system_entry(key: &str) -> SimpleResult<&'static SystemEntry> {
    match SYSTEM_ENTRIES.iter().find(|entry| entry.key == key) {
        Some(entry) => Ok(entry),
        None => bail!("Unknown system \"{}\"", key),
    }
}

pub fn base_url_for_source(source: CatalogSource) -> &'static str {
    match source {
        CatalogSource::NoIntro => NOINTRO_BASE_URL,
        CatalogSource::Redump => REDUMP_BASE_URL,
    }
}

/// Named region presets usable as pre-parse include masks.
pub fn region_preset_regex(name: &str) -> Option<&'static str> {
    match name {
        "us" => Some(r"\((?:[^)]*,\s*)?(?:USA|World)(?:\s*,[^)]*)?\)"),
        "eu" => Some(r"\((?:[^)]*,\s*)?(?:Europe|World)(?:\s*,[^)]*)?\)"),
        "jp" => Some(r"\((?:[^)]*,\s*)?(?:Japan|World)(?:\s*,[^)]*)?\)"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct ScreenScraperCredentials {
    pub dev_id: String,
    pub dev_password: String,
    pub user_id: Option<String>,
    pub user_password: Option<String>,
    pub soft_name: String,
}

impl ScreenScraperCredentials {
    pub fn from_env() -> SimpleResult<Self> {
        let dev_id = match env::var("RETROSD_SS_DEVID") {
            Ok(dev_id) => dev_id,
            Err(_) => bail!("RETROSD_SS_DEVID is not set"),
        };
        let dev_password = match env::var("RETROSD_SS_DEVPASSWORD") {
            Ok(dev_password) => dev_password,
            Err(_) => bail!("RETROSD_SS_DEVPASSWORD is not set"),
        };
        Ok(Self {
            dev_id,
            dev_password,
            user_id: env::var("RETROSD_SS_USER").ok(),
            user_password: env::var("RETROSD_SS_PASSWORD").ok(),
            soft_name: String::from("retrosd"),
        })
    }
}

pub fn get_target_directory() -> PathBuf {
    match env::var("RETROSD_TARGET_DIRECTORY") {
        Ok(directory) => match directory.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(directory.clone())),
            None => PathBuf::from(directory),
        },
        Err(_) => PathBuf::from("."),
    }
}

/// Catalog database location, overridable; relative overrides resolve
/// against the target root.
pub fn get_database_path(target_directory: &std::path::Path) -> PathBuf {
    match env::var("RETROSD_DATABASE") {
        Ok(path) => {
            let path = PathBuf::from(path);
            if path.is_absolute() {
                path
            } else {
                target_directory.join(path)
            }
        }
        Err(_) => target_directory.join(DATABASE_FILENAME),
    }
}
