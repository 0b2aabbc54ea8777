use super::*;
use crate::name_parser::parse_rom_name;
use tempfile::NamedTempFile;

async fn seed(connection: &mut SqliteConnection) {
    for (system, filename, size) in [
        ("gb", "Pokemon Red (USA, Europe).zip", 1024),
        ("gb", "Pokemon Blue (Japan).zip", 1024),
        ("gb", "Tetris (World) (Beta).zip", 512),
        ("gbc", "Pokemon Crystal (USA).zip", 2048),
    ] {
        let id = create_remote_rom(connection, system, "no-intro", filename, Some(size), None)
            .await
            .unwrap();
        let record = parse_rom_name(filename);
        upsert_rom_metadata(connection, id, &record).await.unwrap();
    }
    // the extracted form of one archive is present on disk
    upsert_local_rom(
        connection,
        "Roms/GB/Pokemon Red (USA, Europe).gb",
        "gb",
        "Pokemon Red (USA, Europe).gb",
        "Pokemon Red (USA, Europe)",
        1024,
        None,
        None,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_search_by_title() {
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    seed(&mut connection).await;

    let hits = search_roms(
        &mut connection,
        &SearchQuery {
            query: String::from("Pokemon"),
            ..SearchQuery::default()
        },
    )
    .await;

    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|hit| hit.title.contains("Pokemon")));
}

#[tokio::test]
async fn test_search_filters_by_system() {
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    seed(&mut connection).await;

    let hits = search_roms(
        &mut connection,
        &SearchQuery {
            systems: vec![String::from("gbc")],
            ..SearchQuery::default()
        },
    )
    .await;

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "Pokemon Crystal (USA).zip");
}

#[tokio::test]
async fn test_search_filters_by_region() {
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    seed(&mut connection).await;

    let hits = search_roms(
        &mut connection,
        &SearchQuery {
            regions: vec![String::from("jp")],
            ..SearchQuery::default()
        },
    )
    .await;

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "Pokemon Blue (Japan).zip");
}

#[tokio::test]
async fn test_search_local_only_matches_extracted_files() {
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    seed(&mut connection).await;

    let hits = search_roms(
        &mut connection,
        &SearchQuery {
            local_only: true,
            ..SearchQuery::default()
        },
    )
    .await;

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "Pokemon Red (USA, Europe).zip");
    assert_eq!(
        hits[0].local_path.as_deref(),
        Some("Roms/GB/Pokemon Red (USA, Europe).gb")
    );
}

#[tokio::test]
async fn test_search_excludes_prerelease() {
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    seed(&mut connection).await;

    let hits = search_roms(
        &mut connection,
        &SearchQuery {
            exclude_prerelease: true,
            ..SearchQuery::default()
        },
    )
    .await;

    assert!(!hits.iter().any(|hit| hit.filename.contains("Beta")));
}

#[tokio::test]
async fn test_search_limit_and_offset() {
    let db_file = NamedTempFile::new().unwrap();
    let pool = establish_connection(db_file.path().to_str().unwrap()).await;
    let mut connection = pool.acquire().await.unwrap();
    seed(&mut connection).await;

    let page_one = search_roms(
        &mut connection,
        &SearchQuery {
            limit: 2,
            ..SearchQuery::default()
        },
    )
    .await;
    let page_two = search_roms(
        &mut connection,
        &SearchQuery {
            limit: 2,
            offset: 2,
            ..SearchQuery::default()
        },
    )
    .await;

    assert_eq!(page_one.len(), 2);
    assert_eq!(page_two.len(), 2);
    assert!(page_one.iter().all(|hit| !page_two
        .iter()
        .any(|other| other.filename == hit.filename)));
}
