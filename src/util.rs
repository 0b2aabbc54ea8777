use super::SimpleResult;
use chrono::{DateTime, SecondsFormat, Utc};
use indicatif::ProgressBar;
use std::path::Path;
use tokio::fs;

pub async fn create_directory<P: AsRef<Path>>(
    progress_bar: &ProgressBar,
    path: &P,
    quiet: bool,
) -> SimpleResult<()> {
    if !path.as_ref().is_dir() {
        if !quiet {
            progress_bar.println(format!("Creating \"{}\"", path.as_ref().display()));
        }
        try_with!(
            fs::create_dir_all(path.as_ref()).await,
            "Failed to create \"{:?}\"",
            path.as_ref()
        );
    }
    Ok(())
}

/// Write `contents` to `path` via a temp sibling and an atomic rename.
pub async fn write_file_atomically<P: AsRef<Path>>(
    path: &P,
    contents: &[u8],
) -> SimpleResult<()> {
    let mut tmp_path = path.as_ref().to_path_buf();
    tmp_path.set_extension("tmp");
    try_with!(
        fs::write(&tmp_path, contents).await,
        "Failed to write \"{:?}\"",
        tmp_path
    );
    try_with!(
        fs::rename(&tmp_path, path.as_ref()).await,
        "Failed to rename \"{:?}\" to \"{:?}\"",
        tmp_path,
        path.as_ref()
    );
    Ok(())
}

pub fn utc_now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn format_rfc3339(date_time: &DateTime<Utc>) -> String {
    date_time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Case-insensitive glob match supporting `*` and `?` only.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();
    let mut p = 0;
    let mut n = 0;
    let mut star: Option<usize> = None;
    let mut mark = 0;
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = n;
            p += 1;
        } else if let Some(star_position) = star {
            p = star_position + 1;
            mark += 1;
            n = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
