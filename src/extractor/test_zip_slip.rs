use super::*;
use std::io::Write as _;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[tokio::test]
async fn test_parent_traversal_is_refused() {
    let tmp_directory = TempDir::new().unwrap();
    let archive_path = tmp_directory.path().join("evil.zip");
    {
        let file = File::create(&archive_path).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("../evil.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"pwned").unwrap();
        writer.finish().unwrap();
    }
    let dest = tmp_directory.path().join("out");

    let result = extract_zip(&archive_path, &dest, &ExtractOptions::default()).await;

    assert!(result.is_err());
    assert!(!tmp_directory.path().join("evil.txt").exists());
    // a refused archive is never deleted
    assert!(archive_path.exists());
}

#[tokio::test]
async fn test_corrupt_archive_is_an_error() {
    let tmp_directory = TempDir::new().unwrap();
    let archive_path = tmp_directory.path().join("corrupt.zip");
    std::fs::write(&archive_path, b"this is not a zip").unwrap();
    let dest = tmp_directory.path().join("out");

    let result = extract_zip(&archive_path, &dest, &ExtractOptions::default()).await;

    assert!(result.is_err());
    assert!(archive_path.exists());
}
