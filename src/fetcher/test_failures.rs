use super::*;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn no_retry_options() -> FetchOptions {
    FetchOptions {
        retries: 0,
        quiet: true,
        ..FetchOptions::default()
    }
}

#[tokio::test]
async fn test_not_found_fails_without_retry_and_clears_part() {
    let tmp_directory = TempDir::new().unwrap();
    let destination = tmp_directory.path().join("file.bin");
    fs::write(part_path(&destination), b"partial").await.unwrap();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let options = FetchOptions {
        retries: 3,
        quiet: true,
        ..FetchOptions::default()
    };
    let outcome = fetch_file(
        &reqwest::Client::new(),
        &format!("{}/file.bin", mock_server.uri()),
        &destination,
        None,
        &options,
        &CancellationToken::new(),
    )
    .await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, Some(404));
    assert!(!part_path(&destination).exists());
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_server_error_retries_then_surfaces() {
    let tmp_directory = TempDir::new().unwrap();
    let destination = tmp_directory.path().join("file.bin");

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let options = FetchOptions {
        retries: 2,
        delay: Duration::from_millis(1),
        quiet: true,
        ..FetchOptions::default()
    };
    let outcome = fetch_file(
        &reqwest::Client::new(),
        &format!("{}/file.bin", mock_server.uri()),
        &destination,
        None,
        &options,
        &CancellationToken::new(),
    )
    .await;

    assert!(!outcome.success);
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn test_size_mismatch_preserves_part_for_resume() {
    let tmp_directory = TempDir::new().unwrap();
    let destination = tmp_directory.path().join("file.bin");

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"short".to_vec()))
        .mount(&mock_server)
        .await;

    let outcome = fetch_file(
        &reqwest::Client::new(),
        &format!("{}/file.bin", mock_server.uri()),
        &destination,
        // remote listing says the file is larger than what the body carries
        Some(100),
        &no_retry_options(),
        &CancellationToken::new(),
    )
    .await;

    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap().contains("Size mismatch"));
    assert!(!destination.exists());
    assert_eq!(fs::read(part_path(&destination)).await.unwrap(), b"short");
}

#[tokio::test]
async fn test_destination_never_observable_truncated() {
    // at all times the final path either does not exist or is complete
    let tmp_directory = TempDir::new().unwrap();
    let destination = tmp_directory.path().join("file.bin");

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"half".to_vec()))
        .mount(&mock_server)
        .await;

    let outcome = fetch_file(
        &reqwest::Client::new(),
        &format!("{}/file.bin", mock_server.uri()),
        &destination,
        Some(8),
        &no_retry_options(),
        &CancellationToken::new(),
    )
    .await;

    assert!(!outcome.success);
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_cancellation_aborts_with_error() {
    let tmp_directory = TempDir::new().unwrap();
    let destination = tmp_directory.path().join("file.bin");

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 1024 * 1024])
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let cancellation = CancellationToken::new();
    let token = cancellation.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let outcome = fetch_file(
        &reqwest::Client::new(),
        &format!("{}/file.bin", mock_server.uri()),
        &destination,
        Some(1024 * 1024),
        &no_retry_options(),
        &cancellation,
    )
    .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Cancelled"));
    assert!(!destination.exists());
}
