use super::*;

fn filenames() -> Vec<String> {
    [
        "Game A (USA).zip",
        "Game B (Europe) (En,Fr,De).zip",
        "Game C (Japan).zip",
        "Game D (France).zip",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[test]
fn test_include_region_codes() {
    let options = FilterOptions {
        include_region_codes: vec![String::from("us"), String::from("eu")],
        ..FilterOptions::default()
    };

    let kept = filter_filenames(&filenames(), &options);

    assert_eq!(kept, vec!["Game A (USA).zip", "Game B (Europe) (En,Fr,De).zip"]);
}

#[test]
fn test_exclude_region_codes() {
    let options = FilterOptions {
        exclude_region_codes: vec![String::from("jp")],
        ..FilterOptions::default()
    };

    let kept = filter_filenames(&filenames(), &options);

    assert_eq!(kept.len(), 3);
    assert!(!kept.contains(&String::from("Game C (Japan).zip")));
}

#[test]
fn test_include_language_codes_without_inference() {
    let options = FilterOptions {
        include_language_codes: vec![String::from("fr")],
        ..FilterOptions::default()
    };

    let kept = filter_filenames(&filenames(), &options);

    // only Game B carries explicit language tokens
    assert_eq!(kept, vec!["Game B (Europe) (En,Fr,De).zip"]);
}

#[test]
fn test_include_language_codes_with_inference() {
    let options = FilterOptions {
        include_language_codes: vec![String::from("fr")],
        infer_language_codes: true,
        ..FilterOptions::default()
    };

    let kept = filter_filenames(&filenames(), &options);

    // Game D (France) now infers fr
    assert_eq!(
        kept,
        vec!["Game B (Europe) (En,Fr,De).zip", "Game D (France).zip"]
    );
}

#[test]
fn test_exclude_language_codes_with_inference() {
    let options = FilterOptions {
        exclude_language_codes: vec![String::from("ja")],
        infer_language_codes: true,
        ..FilterOptions::default()
    };

    let kept = filter_filenames(&filenames(), &options);

    assert!(!kept.contains(&String::from("Game C (Japan).zip")));
}

#[test]
fn test_region_regex_preset() {
    let options = FilterOptions {
        region_filter_regex: Some(
            regex::Regex::new(crate::config::region_preset_regex("us").unwrap()).unwrap(),
        ),
        ..FilterOptions::default()
    };
    let filenames = vec![
        String::from("Game A (USA).zip"),
        String::from("Game B (Japan, USA).zip"),
        String::from("Game C (World).zip"),
        String::from("Game D (Japan).zip"),
    ];

    let kept = filter_filenames(&filenames, &options);

    assert_eq!(kept.len(), 3);
    assert!(!kept.contains(&String::from("Game D (Japan).zip")));
}
