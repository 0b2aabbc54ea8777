use super::*;
use chrono::TimeZone;

const PIPE_TABLE: &str = "\
Pokemon Red (USA, Europe).zip | 389.5 KiB | 02-Feb-2024 12:34
Mother 3 (Japan).zip | 12 MiB | 03-Feb-2024 01:02
media/ | - | 01-Jan-2024 00:00
readme.txt | 1 KiB | 04-Feb-2024 08:00
";

#[test]
fn test_pipe_table_fallback() {
    let pattern = regex::Regex::new(r"\.zip$").unwrap();

    let files = parse_directory_listing(PIPE_TABLE, &pattern);

    assert_eq!(files.len(), 2);
    assert_eq!(files[0].filename, "Pokemon Red (USA, Europe).zip");
    assert_eq!(files[0].size, Some((389.5f64 * 1024.0).round() as u64));
    assert_eq!(
        files[1].last_modified,
        Some(Utc.with_ymd_and_hms(2024, 2, 3, 1, 2, 0).unwrap())
    );
}

#[test]
fn test_pipe_table_skips_directories() {
    let pattern = regex::Regex::new(r".*").unwrap();

    let files = parse_directory_listing(PIPE_TABLE, &pattern);

    assert!(!files.iter().any(|f| f.filename.starts_with("media")));
}

#[test]
fn test_empty_body_yields_no_files() {
    let pattern = regex::Regex::new(r"\.zip$").unwrap();

    assert!(parse_directory_listing("", &pattern).is_empty());
}
