use super::SimpleResult;
use chrono::{DateTime, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

/// One file row from a remote directory index.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub filename: String,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

lazy_static! {
    static ref SIZE_REGEX: Regex =
        Regex::new(r"(?i)^([0-9]+(?:\.[0-9]+)?)\s*(b|kb|kib|mb|mib|gb|gib|tb|tib)$").unwrap();
    static ref ROW_SELECTOR: Selector = Selector::parse("tr").unwrap();
    static ref CELL_SELECTOR: Selector = Selector::parse("td").unwrap();
    static ref LINK_SELECTOR: Selector = Selector::parse("a").unwrap();
}

/// Fetch the HTML body of a remote directory index.
pub async fn fetch_directory_index(
    client: &reqwest::Client,
    url: &str,
    cancellation: &CancellationToken,
) -> SimpleResult<String> {
    let response = tokio::select! {
        _ = cancellation.cancelled() => bail!("Cancelled"),
        response = client.get(url).send() => {
            try_with!(response, "Failed to fetch listing {}", url)
        }
    };
    if !response.status().is_success() {
        bail!(
            "Failed to fetch listing {}: HTTP {}",
            url,
            response.status().as_u16()
        );
    }
    let html = tokio::select! {
        _ = cancellation.cancelled() => bail!("Cancelled"),
        body = response.text() => try_with!(body, "Failed to read listing {}", url),
    };
    Ok(html)
}

/// Parse a directory index into an ordered file list. Rows whose filename
/// does not match `archive_pattern` are dropped, as are parent and
/// directory entries.
pub fn parse_directory_listing(html: &str, archive_pattern: &Regex) -> Vec<RemoteFile> {
    let document = Html::parse_document(html);
    let mut files = Vec::new();
    let mut saw_rows = false;

    for row in document.select(&ROW_SELECTOR) {
        saw_rows = true;
        let Some(link) = row.select(&LINK_SELECTOR).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(filename) = decode_file_href(href) else {
            continue;
        };
        if !archive_pattern.is_match(&filename) {
            continue;
        }
        let cells: Vec<String> = row
            .select(&CELL_SELECTOR)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();
        let (size, last_modified) = parse_row_cells(&cells);
        files.push(RemoteFile {
            filename,
            size,
            last_modified,
        });
    }

    if !saw_rows || files.is_empty() {
        let fallback = parse_pipe_table(html, archive_pattern);
        if !fallback.is_empty() {
            return fallback;
        }
    }

    files
}

/// Timestamp of the `./` row, used to skip unchanged directories cheaply.
pub fn parse_directory_last_modified(html: &str) -> Option<DateTime<Utc>> {
    let document = Html::parse_document(html);
    for row in document.select(&ROW_SELECTOR) {
        let Some(link) = row.select(&LINK_SELECTOR).next() else {
            continue;
        };
        match link.value().attr("href") {
            Some("./") | Some(".") => (),
            _ => continue,
        }
        let cells: Vec<String> = row
            .select(&CELL_SELECTOR)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();
        let (_, last_modified) = parse_row_cells(&cells);
        return last_modified;
    }
    None
}

fn decode_file_href(href: &str) -> Option<String> {
    if href.starts_with('#') || href.starts_with('?') {
        return None;
    }
    // some indices link absolute URLs, keep only the path
    let decoded = if href.starts_with("http://") || href.starts_with("https://") {
        let parsed = url::Url::parse(href).ok()?;
        urlencoding::decode(parsed.path()).ok()?.into_owned()
    } else {
        urlencoding::decode(href).ok()?.into_owned()
    };
    if decoded == "." || decoded == ".." || decoded == "./" || decoded == "../" {
        return None;
    }
    // directory entries carry a trailing slash
    if decoded.ends_with('/') {
        return None;
    }
    let filename = decoded.rsplit('/').next().unwrap_or(&decoded).to_string();
    if filename.is_empty() {
        return None;
    }
    Some(filename)
}

fn parse_row_cells(cells: &[String]) -> (Option<u64>, Option<DateTime<Utc>>) {
    let mut size = None;
    let mut last_modified = None;
    for cell in cells {
        if cell.is_empty() {
            continue;
        }
        if size.is_none() {
            if let Some(parsed) = parse_size(cell) {
                size = Some(parsed);
                continue;
            }
        }
        if last_modified.is_none() {
            if let Some(parsed) = parse_timestamp(cell) {
                last_modified = Some(parsed);
            }
        }
    }
    (size, last_modified)
}

/// Parse a human size token into bytes. A cell that looks like a size but
/// does not parse cleanly yields 0.
fn parse_size(cell: &str) -> Option<u64> {
    let captures = SIZE_REGEX.captures(cell)?;
    let value: f64 = match captures.get(1).unwrap().as_str().parse() {
        Ok(value) => value,
        Err(_) => return Some(0),
    };
    let multiplier: u64 = match captures.get(2).unwrap().as_str().to_lowercase().as_str() {
        "b" => 1,
        "kb" => 1000,
        "kib" => 1024,
        "mb" => 1000 * 1000,
        "mib" => 1024 * 1024,
        "gb" => 1000 * 1000 * 1000,
        "gib" => 1024 * 1024 * 1024,
        "tb" => 1000 * 1000 * 1000 * 1000,
        "tib" => 1024 * 1024 * 1024 * 1024,
        _ => return Some(0),
    };
    Some((value * multiplier as f64).round() as u64)
}

fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    for format in ["%d-%b-%Y %H:%M:%S", "%d-%b-%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(cell, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(cell) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(cell) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(cell, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Fallback for indices rendered as pipe tables instead of HTML rows.
fn parse_pipe_table(body: &str, archive_pattern: &Regex) -> Vec<RemoteFile> {
    let mut files = Vec::new();
    for line in body.lines() {
        if !line.contains('|') {
            continue;
        }
        let cells: Vec<String> = line
            .split('|')
            .map(|cell| cell.trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect();
        let Some(first) = cells.first() else {
            continue;
        };
        let Some(filename) = decode_file_href(first) else {
            continue;
        };
        if !archive_pattern.is_match(&filename) {
            continue;
        }
        let (size, last_modified) = parse_row_cells(&cells[1..]);
        files.push(RemoteFile {
            filename,
            size,
            last_modified,
        });
    }
    files
}

#[cfg(test)]
mod test_pipe_table;
