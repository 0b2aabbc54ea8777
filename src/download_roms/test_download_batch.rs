use super::*;
use crate::model::CatalogSource;
use std::io::Write as _;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn test_entry() -> SystemEntry {
    SystemEntry {
        key: "test",
        source: CatalogSource::NoIntro,
        remote_path: "Test System/",
        archive_pattern: r"\.zip$",
        extract_glob: Some("*.rom"),
        dest_directory: "TEST",
        extract: true,
        label: "Test System",
        bios_filenames: &[],
    }
}

pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, contents) in entries {
            writer
                .start_file(name.to_string(), zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn listing_html(rows: &[(&str, usize)]) -> String {
    let mut html = String::from(
        "<html><body><table><tbody>\
         <tr><td><a href=\"./\">./</a></td><td>-</td><td>14-Mar-2024 09:30</td></tr>\
         <tr><td><a href=\"../\">../</a></td><td>-</td><td>-</td></tr>",
    );
    for (filename, size) in rows {
        html.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>{} B</td><td>01-Feb-2024 10:00</td></tr>",
            urlencoding::encode(filename),
            filename,
            size
        ));
    }
    html.push_str("</tbody></table></body></html>");
    html
}

pub fn source_urls(mock_server: &MockServer) -> SourceUrls {
    SourceUrls {
        no_intro: mock_server.uri(),
        redump: mock_server.uri(),
    }
}

async fn mount_catalog(mock_server: &MockServer, archives: &[(&str, Vec<u8>)]) {
    let rows: Vec<(&str, usize)> = archives
        .iter()
        .map(|(name, body)| (*name, body.len()))
        .collect();
    Mock::given(method("GET"))
        .and(path_regex(r"/Test%20System/$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&rows)))
        .mount(mock_server)
        .await;
    for (name, body) in archives {
        let pattern = format!(
            "{}$",
            regex::escape(&format!("/Test%20System/{}", urlencoding::encode(name)))
        );
        Mock::given(method("GET"))
            .and(path_regex(pattern))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(mock_server)
            .await;
    }
}

#[tokio::test]
async fn test_download_extract_and_manifest() {
    // given
    let target = TempDir::new().unwrap();
    let progress_bar = ProgressBar::hidden();
    let zip_a = build_zip(&[("Game A (USA).rom", b"rom-a")]);
    let zip_b = build_zip(&[("Game B (Europe).rom", b"rom-b")]);

    let mock_server = MockServer::start().await;
    mount_catalog(
        &mock_server,
        &[
            ("Game A (USA).zip", zip_a),
            ("Game B (Europe).zip", zip_b),
        ],
    )
    .await;

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let entry = test_entry();

    // when
    let summaries = download_systems(
        &progress_bar,
        &reqwest::Client::new(),
        target.path(),
        &[&entry],
        &source_urls(&mock_server),
        &DownloadOptions::default(),
        &EventSink::new(sender),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    // then
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.success, 2, "{:?}", summary.failures);
    assert_eq!(summary.failed, 0);

    let dest = target.path().join("Roms").join("TEST");
    assert!(dest.join("Game A (USA).rom").is_file());
    assert!(dest.join("Game B (Europe).rom").is_file());
    // archives are consumed by extraction
    assert!(!dest.join("Game A (USA).zip").exists());

    let manifest = load_manifest(target.path()).await;
    assert_eq!(manifest.entries.len(), 2);
    assert!(manifest.entries.contains_key("TEST/Game A (USA).zip"));
    assert!(manifest.is_directory_current("test", Some("2024-03-14T09:30:00Z")));

    let mut saw_listing = false;
    let mut saw_batch_complete = false;
    while let Ok(event) = receiver.try_recv() {
        match event {
            DownloadEvent::Listing { count, .. } => {
                saw_listing = true;
                assert_eq!(count, 2);
            }
            DownloadEvent::BatchComplete {
                success, failed, ..
            } => {
                saw_batch_complete = true;
                assert_eq!(success, 2);
                assert_eq!(failed, 0);
            }
            _ => (),
        }
    }
    assert!(saw_listing);
    assert!(saw_batch_complete);
}

#[tokio::test]
async fn test_second_run_skips_extracted_files() {
    let target = TempDir::new().unwrap();
    let progress_bar = ProgressBar::hidden();
    let zip_a = build_zip(&[("Game A (USA).rom", b"rom-a")]);

    let mock_server = MockServer::start().await;
    mount_catalog(&mock_server, &[("Game A (USA).zip", zip_a)]).await;

    let entry = test_entry();
    let client = reqwest::Client::new();
    download_systems(
        &progress_bar,
        &client,
        target.path(),
        &[&entry],
        &source_urls(&mock_server),
        &DownloadOptions::default(),
        &EventSink::disabled(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let summaries = download_systems(
        &progress_bar,
        &client,
        target.path(),
        &[&entry],
        &source_urls(&mock_server),
        &DownloadOptions::default(),
        &EventSink::disabled(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summaries[0].success, 0);
    assert_eq!(summaries[0].skipped, 1);
}

#[tokio::test]
async fn test_per_file_failure_does_not_abort_the_system() {
    let target = TempDir::new().unwrap();
    let progress_bar = ProgressBar::hidden();
    let zip_a = build_zip(&[("Game A (USA).rom", b"rom-a")]);

    let mock_server = MockServer::start().await;
    let rows = vec![
        ("Game A (USA).zip", zip_a.len()),
        ("Game B (Europe).zip", 999usize),
    ];
    Mock::given(method("GET"))
        .and(path_regex(r"/Test%20System/$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(&rows)))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(regex::escape(&format!(
            "/Test%20System/{}",
            urlencoding::encode("Game A (USA).zip")
        ))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_a))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(regex::escape(&format!(
            "/Test%20System/{}",
            urlencoding::encode("Game B (Europe).zip")
        ))))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let entry = test_entry();
    let options = DownloadOptions {
        retries: 0,
        delay: Duration::from_millis(1),
        ..DownloadOptions::default()
    };
    let summaries = download_systems(
        &progress_bar,
        &reqwest::Client::new(),
        target.path(),
        &[&entry],
        &source_urls(&mock_server),
        &options,
        &EventSink::disabled(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let summary = &summaries[0];
    assert_eq!(summary.success, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].0.contains("Game B"));
}

#[tokio::test]
async fn test_listing_failure_fails_the_system_only() {
    let target = TempDir::new().unwrap();
    let progress_bar = ProgressBar::hidden();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let entry = test_entry();
    let summaries = download_systems(
        &progress_bar,
        &reqwest::Client::new(),
        target.path(),
        &[&entry],
        &source_urls(&mock_server),
        &DownloadOptions::default(),
        &EventSink::disabled(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].failed, 1);
    assert_eq!(summaries[0].failures[0].0, "listing");
}
