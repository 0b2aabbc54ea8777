use super::*;

#[test]
fn test_numeric_revision() {
    let record = parse_rom_name("Pokemon Red (USA, Europe) (Rev 2).gb");

    assert_eq!(record.version.as_deref(), Some("Rev 2"));
    assert_eq!(
        record.version_info,
        Some(VersionInfo {
            kind: VersionKind::Rev,
            parts: vec![2],
            letter: None,
        })
    );
}

#[test]
fn test_letter_revision() {
    let record = parse_rom_name("Zelda no Densetsu (Japan) (Rev A).gb");

    assert_eq!(record.version.as_deref(), Some("Rev A"));
    let info = record.version_info.unwrap();
    assert_eq!(info.kind, VersionKind::Rev);
    assert!(info.parts.is_empty());
    assert_eq!(info.letter, Some('A'));
}

#[test]
fn test_dotted_version() {
    let record = parse_rom_name("Tetris (World) (v1.2.3).gb");

    assert_eq!(record.version.as_deref(), Some("v1.2.3"));
    let info = record.version_info.unwrap();
    assert_eq!(info.kind, VersionKind::Ver);
    assert_eq!(info.parts, vec![1, 2, 3]);
}

#[test]
fn test_version_with_letter_suffix() {
    let record = parse_rom_name("Tetris (World) (v1.1a).gb");

    let info = record.version_info.unwrap();
    assert_eq!(info.parts, vec![1, 1]);
    assert_eq!(info.letter, Some('a'));
}

#[test]
fn test_numbered_beta_sets_version_and_prerelease() {
    let record = parse_rom_name("Game (World) (Beta 3).md");

    assert!(record.flags.prerelease);
    assert_eq!(record.version.as_deref(), Some("Beta 3"));
    assert_eq!(record.version_info.unwrap().parts, vec![3]);
}

#[test]
fn test_no_version() {
    let record = parse_rom_name("Game (World).md");

    assert!(record.version.is_none());
    assert!(record.version_info.is_none());
}
