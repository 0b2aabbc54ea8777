use super::*;
use crate::config::ScreenScraperCredentials;
use crate::model::CatalogSource;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_entry() -> SystemEntry {
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
    }
}

fn credentials() -> ScreenScraperCredentials {
    ScreenScraperCredentials {
        dev_id: String::from("dev"),
        dev_password: String::from("devpass"),
        user_id: None,
        user_password: None,
        soft_name: String::from("retrosd"),
    }
}

fn png_body() -> Vec<u8> {
    let mut body = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    body.resize(2048, 0);
    body
}

fn game_json(media_server: &MockServer) -> String {
    format!(
        r#"{{
  "response": {{
    "jeu": {{
      "id": "2567",
      "noms": [{{"region": "wor", "text": "Pokemon Red"}}],
      "region": "wor",
      "medias": [
        {{"type": "box-2D", "url": "{0}/box.png", "format": "png", "region": "wor"}},
        {{"type": "ss", "url": "{0}/ss.png", "format": "png", "region": "us"}}
      ]
    }}
  }}
}}"#,
        media_server.uri()
    )
}

async fn seed_rom(connection: &mut SqliteConnection) {
    upsert_local_rom(
        connection,
        "Roms/GB/Pokemon Red (USA, Europe).gb",
        "gb",
        "Pokemon Red (USA, Europe).gb",
        "Pokemon Red (USA, Europe)",
        1024,
        Some("aa11"),
        Some("bb22"),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_scrape_downloads_media_and_caches_lookup() {
    // given
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    let progress_bar = ProgressBar::hidden();
    let target = TempDir::new().unwrap();
    seed_rom(&mut connection).await;

    let media_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/box.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(png_body()),
        )
        .mount(&media_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ss.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(png_body()),
        )
        .mount(&media_server)
        .await;

    let api_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jeuInfos.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(game_json(&media_server)))
        .expect(1)
        .mount(&api_server)
        .await;

    let api_client =
        ScreenScraperClient::with_base_url(credentials(), &api_server.uri()).unwrap();
    let limiter = LaneRateLimiter::new(2, Duration::from_millis(1));
    let options = ScrapeOptions {
        lanes: 2,
        min_delay: Duration::from_millis(1),
        ..ScrapeOptions::default()
    };

    // when
    let summary = scrape_system(
        &mut connection,
        &progress_bar,
        &api_client,
        &reqwest::Client::new(),
        &limiter,
        target.path(),
        &test_entry(),
        &options,
        &EventSink::disabled(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    // then
    assert_eq!(summary.success, 1);
    assert_eq!(summary.failed, 0);

    let media_directory = target.path().join("Roms").join("GB").join("media");
    assert!(
        media_directory
            .join("Pokemon Red (USA, Europe)-box.png")
            .is_file()
    );
    assert!(
        media_directory
            .join("Pokemon Red (USA, Europe)-screenshot.png")
            .is_file()
    );

    let entry = find_scraper_cache_entry(&mut connection, "gb:sha1:aa11")
        .await
        .unwrap();
    assert_eq!(entry.game_id, Some(2567));
    assert_eq!(entry.game_name.as_deref(), Some("Pokemon Red"));

    // a second run hits the cache and skips existing files; the API mock
    // would fail its expectation if it were called again
    let summary = scrape_system(
        &mut connection,
        &progress_bar,
        &api_client,
        &reqwest::Client::new(),
        &limiter,
        target.path(),
        &test_entry(),
        &options,
        &EventSink::disabled(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn test_html_error_page_fails_medium_but_not_the_rest() {
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    let progress_bar = ProgressBar::hidden();
    let target = TempDir::new().unwrap();
    seed_rom(&mut connection).await;

    let media_server = MockServer::start().await;
    // the box art endpoint serves an HTML error page, three times
    Mock::given(method("GET"))
        .and(path("/box.png"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<!DOCTYPE html><html><body>502 Bad Gateway</body></html>",
        ))
        .expect(3)
        .mount(&media_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ss.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(png_body()),
        )
        .mount(&media_server)
        .await;

    let api_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(game_json(&media_server)))
        .mount(&api_server)
        .await;

    let api_client =
        ScreenScraperClient::with_base_url(credentials(), &api_server.uri()).unwrap();
    let limiter = LaneRateLimiter::new(2, Duration::from_millis(1));
    let options = ScrapeOptions {
        lanes: 2,
        min_delay: Duration::from_millis(1),
        ..ScrapeOptions::default()
    };

    let summary = scrape_system(
        &mut connection,
        &progress_bar,
        &api_client,
        &reqwest::Client::new(),
        &limiter,
        target.path(),
        &test_entry(),
        &options,
        &EventSink::disabled(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    // the ROM counts as failed, but the screenshot still landed
    assert_eq!(summary.failed, 1);
    let media_directory = target.path().join("Roms").join("GB").join("media");
    assert!(
        media_directory
            .join("Pokemon Red (USA, Europe)-screenshot.png")
            .is_file()
    );
    assert!(
        !media_directory
            .join("Pokemon Red (USA, Europe)-box.png")
            .exists()
    );
    // the invalid payload was deleted, no temp file remains
    assert!(
        !media_directory
            .join("Pokemon Red (USA, Europe)-box.png.tmp")
            .exists()
    );
}

#[tokio::test]
async fn test_legacy_json_cache_is_migrated_once() {
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    let progress_bar = ProgressBar::hidden();
    let target = TempDir::new().unwrap();

    let system_directory = target.path().join("Roms").join("GB");
    tokio::fs::create_dir_all(&system_directory).await.unwrap();
    let legacy_path = system_directory.join(".scraper-cache.json");
    tokio::fs::write(
        &legacy_path,
        r#"{"gb:sha1:aa11": {"game_id": 42, "game_name": "Old Game", "media_urls": {}}}"#,
    )
    .await
    .unwrap();

    let api_server = MockServer::start().await;
    let api_client =
        ScreenScraperClient::with_base_url(credentials(), &api_server.uri()).unwrap();
    let limiter = LaneRateLimiter::new(1, Duration::from_millis(1));

    scrape_system(
        &mut connection,
        &progress_bar,
        &api_client,
        &reqwest::Client::new(),
        &limiter,
        target.path(),
        &test_entry(),
        &ScrapeOptions::default(),
        &EventSink::disabled(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(!legacy_path.exists());
    assert!(
        system_directory
            .join(".scraper-cache.json.migrated")
            .is_file()
    );
    let entry = find_scraper_cache_entry(&mut connection, "gb:sha1:aa11")
        .await
        .unwrap();
    assert_eq!(entry.game_id, Some(42));
    assert_eq!(entry.game_name.as_deref(), Some("Old Game"));
}
