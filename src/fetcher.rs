use futures::StreamExt;
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

const STREAM_BUFFER_SIZE: usize = 1024 * 1024;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>, f64) + Send + Sync>;

pub struct FetchOptions {
    pub retries: u32,
    pub delay: Duration,
    pub quiet: bool,
    pub verbose: bool,
    pub headers: Vec<(String, String)>,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(1),
            quiet: false,
            verbose: false,
            headers: Vec::new(),
            on_progress: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub success: bool,
    pub skipped: bool,
    pub bytes_downloaded: u64,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub error: Option<String>,
}

enum Attempt {
    Success { bytes_downloaded: u64, skipped: bool },
    Fatal(String),
    Retry(String),
    Cancelled,
}

pub fn part_path(destination: &Path) -> PathBuf {
    let mut path = OsString::from(destination.as_os_str());
    path.push(".part");
    PathBuf::from(path)
}

/// Fetch one URL to a destination path, resuming from a `.part` sibling when
/// one exists. The rename of `.part` onto the destination is the commit
/// point; a failed or cancelled attempt leaves the `.part` in place so the
/// next attempt resumes.
pub async fn fetch_file(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
    expected_size: Option<u64>,
    options: &FetchOptions,
    cancellation: &CancellationToken,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    if let Some(parent) = destination.parent() {
        if let Err(error) = fs::create_dir_all(parent).await {
            outcome.error = Some(format!("Failed to create {:?}: {}", parent, error));
            return outcome;
        }
    }

    let part = part_path(destination);
    let mut last_error = None;

    for attempt in 0..=options.retries {
        if attempt > 0 {
            let backoff = options
                .delay
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(MAX_BACKOFF);
            if options.verbose {
                debug!("Retrying {} after {:?}", url, backoff);
            }
            tokio::select! {
                _ = cancellation.cancelled() => {
                    outcome.error = Some(String::from("Cancelled"));
                    return outcome;
                }
                _ = sleep(backoff) => (),
            }
        }

        match fetch_once(
            client,
            url,
            destination,
            &part,
            expected_size,
            options,
            cancellation,
            &mut outcome,
        )
        .await
        {
            Attempt::Success {
                bytes_downloaded,
                skipped,
            } => {
                outcome.success = true;
                outcome.skipped = skipped;
                outcome.bytes_downloaded = bytes_downloaded;
                outcome.error = None;
                return outcome;
            }
            Attempt::Fatal(error) => {
                outcome.error = Some(error);
                return outcome;
            }
            Attempt::Retry(error) => {
                if !options.quiet {
                    warn!("{}: {}", url, error);
                }
                last_error = Some(error);
            }
            Attempt::Cancelled => {
                outcome.error = Some(String::from("Cancelled"));
                return outcome;
            }
        }
    }

    outcome.error = last_error.or_else(|| Some(String::from("Retries exhausted")));
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    destination: &Path,
    part: &Path,
    expected_size: Option<u64>,
    options: &FetchOptions,
    cancellation: &CancellationToken,
    outcome: &mut FetchOutcome,
) -> Attempt {
    let part_size = match fs::metadata(part).await {
        Ok(metadata) => metadata.len(),
        Err(_) => 0,
    };

    let mut request = client.get(url);
    for (name, value) in &options.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if part_size > 0 {
        request = request.header(RANGE, format!("bytes={}-", part_size));
    }

    let response = tokio::select! {
        _ = cancellation.cancelled() => return Attempt::Cancelled,
        response = request.send() => match response {
            Ok(response) => response,
            Err(error) => return Attempt::Retry(format!("Request failed: {}", error)),
        },
    };

    let status = response.status();
    outcome.status_code = Some(status.as_u16());
    outcome.content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    let (resume_from, total_size) = match status {
        StatusCode::OK => (0, expected_size.or(response.content_length())),
        StatusCode::PARTIAL_CONTENT => {
            let total = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_content_range_total)
                .or(expected_size);
            (part_size, total)
        }
        StatusCode::NOT_MODIFIED => {
            return Attempt::Success {
                bytes_downloaded: 0,
                skipped: true,
            };
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            fs::remove_file(part).await.ok();
            return Attempt::Fatal(format!("Not found: {}", url));
        }
        StatusCode::RANGE_NOT_SATISFIABLE => {
            if let Some(expected) = expected_size {
                if part_size >= expected {
                    return match commit(destination, part).await {
                        Ok(()) => Attempt::Success {
                            bytes_downloaded: 0,
                            skipped: false,
                        },
                        Err(error) => Attempt::Fatal(error),
                    };
                }
            }
            fs::remove_file(part).await.ok();
            return Attempt::Retry(String::from("Range not satisfiable, restarting"));
        }
        status if status.is_success() => (0, expected_size.or(response.content_length())),
        status => {
            return Attempt::Retry(format!("Unexpected status {}", status.as_u16()));
        }
    };

    let file = if resume_from > 0 {
        fs::OpenOptions::new().append(true).open(part).await
    } else {
        fs::File::create(part).await
    };
    let file = match file {
        Ok(file) => file,
        Err(error) => return Attempt::Fatal(format!("Failed to open {:?}: {}", part, error)),
    };
    let mut writer = BufWriter::with_capacity(STREAM_BUFFER_SIZE, file);

    let started = Instant::now();
    let mut written = resume_from;
    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = cancellation.cancelled() => {
                writer.flush().await.ok();
                return Attempt::Cancelled;
            }
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                if let Err(error) = writer.write_all(&bytes).await {
                    writer.flush().await.ok();
                    return Attempt::Fatal(format!("Failed to write {:?}: {}", part, error));
                }
                written += bytes.len() as u64;
                if let Some(on_progress) = &options.on_progress {
                    let elapsed = started.elapsed().as_secs_f64();
                    let speed = if elapsed > 0.0 {
                        (written - resume_from) as f64 / elapsed
                    } else {
                        0.0
                    };
                    on_progress(written, total_size, speed);
                }
            }
            Some(Err(error)) => {
                writer.flush().await.ok();
                return Attempt::Retry(format!("Body read failed: {}", error));
            }
            None => break,
        }
    }
    if let Err(error) = writer.flush().await {
        return Attempt::Fatal(format!("Failed to flush {:?}: {}", part, error));
    }

    let final_size = match fs::metadata(part).await {
        Ok(metadata) => metadata.len(),
        Err(error) => return Attempt::Fatal(format!("Failed to stat {:?}: {}", part, error)),
    };
    if final_size == 0 {
        fs::remove_file(part).await.ok();
        return Attempt::Retry(String::from("Empty download"));
    }
    if let Some(total) = total_size {
        if final_size != total {
            // keep the partial file, the next attempt resumes from it
            return Attempt::Retry(format!(
                "Size mismatch: expected {} bytes, have {}",
                total, final_size
            ));
        }
    }

    match commit(destination, part).await {
        Ok(()) => Attempt::Success {
            bytes_downloaded: written - resume_from,
            skipped: false,
        },
        Err(error) => Attempt::Fatal(error),
    }
}

/// Replace the destination with the completed partial file. The rename is
/// the commit point.
async fn commit(destination: &Path, part: &Path) -> Result<(), String> {
    if fs::metadata(destination).await.is_ok() {
        if let Err(error) = fs::remove_file(destination).await {
            return Err(format!("Failed to remove {:?}: {}", destination, error));
        }
    }
    fs::rename(part, destination)
        .await
        .map_err(|error| format!("Failed to rename {:?}: {}", part, error))
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    let total = value.rsplit('/').next()?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod test_failures;
