use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Events pushed by the download engine. Each carries the stable task id
/// (the destination-relative path) so the host can render without reading
/// engine state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DownloadEvent {
    #[serde(rename_all = "camelCase")]
    Listing { system: String, count: usize },
    #[serde(rename_all = "camelCase")]
    Filtered {
        system: String,
        kept: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    BatchStart { system: String, tasks: usize },
    #[serde(rename_all = "camelCase")]
    Start {
        task_id: String,
        filename: String,
        size: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Progress {
        task_id: String,
        current: u64,
        total: Option<u64>,
        bytes_per_second: f64,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        task_id: String,
        bytes_downloaded: u64,
        skipped: bool,
    },
    #[serde(rename_all = "camelCase")]
    Error { task_id: String, message: String },
    #[serde(rename_all = "camelCase")]
    ExtractStart { task_id: String, archive: String },
    #[serde(rename_all = "camelCase")]
    ExtractComplete { task_id: String, files: usize },
    #[serde(rename_all = "camelCase")]
    ExtractError { task_id: String, message: String },
    #[serde(rename_all = "camelCase")]
    BatchComplete {
        system: String,
        success: usize,
        failed: usize,
        skipped: usize,
        bytes_downloaded: u64,
        duration_ms: u64,
    },
}

/// Events pushed by the catalog sync.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    #[serde(rename_all = "camelCase")]
    Skip { system: String, source: String },
    #[serde(rename_all = "camelCase")]
    Synced {
        system: String,
        source: String,
        inserted: usize,
        updated: usize,
        deleted: usize,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        system: String,
        source: String,
        message: String,
    },
}

/// Events pushed by the artwork scraper.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScrapeEvent {
    #[serde(rename_all = "camelCase")]
    Scan { system: String, count: usize },
    #[serde(rename_all = "camelCase")]
    BatchStart { system: String, total: usize },
    #[serde(rename_all = "camelCase")]
    Lookup {
        task_id: String,
        cache_hit: bool,
        game_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DownloadStart { task_id: String, kind: String },
    #[serde(rename_all = "camelCase")]
    DownloadComplete {
        task_id: String,
        kind: String,
        path: String,
    },
    #[serde(rename_all = "camelCase")]
    DownloadError {
        task_id: String,
        kind: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Complete { task_id: String },
    #[serde(rename_all = "camelCase")]
    Error { task_id: String, message: String },
    #[serde(rename_all = "camelCase")]
    BatchComplete {
        system: String,
        success: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
    },
}

/// Best-effort event channel. A closed or absent receiver never fails the
/// operation that emits.
#[derive(Debug)]
pub struct EventSink<T> {
    sender: Option<UnboundedSender<T>>,
}

impl<T> EventSink<T> {
    pub fn new(sender: UnboundedSender<T>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: T) {
        if let Some(sender) = &self.sender {
            sender.send(event).ok();
        }
    }
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
