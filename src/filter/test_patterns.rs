use super::*;

fn filenames() -> Vec<String> {
    [
        "Pokemon Red (USA, Europe).zip",
        "Pokemon Blue (USA, Europe).zip",
        "Mother 3 (Japan).zip",
        "Tetris (World) (Beta).zip",
        "Some Hack (USA) (Hack).zip",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[test]
fn test_no_filters_keep_everything() {
    let kept = filter_filenames(&filenames(), &FilterOptions::default());

    assert_eq!(kept.len(), 5);
}

#[test]
fn test_include_patterns() {
    let options = FilterOptions {
        include_patterns: Some(String::from("Pokemon*")),
        ..FilterOptions::default()
    };

    let kept = filter_filenames(&filenames(), &options);

    assert_eq!(
        kept,
        vec![
            "Pokemon Red (USA, Europe).zip",
            "Pokemon Blue (USA, Europe).zip"
        ]
    );
}

#[test]
fn test_exclude_patterns() {
    let options = FilterOptions {
        exclude_patterns: Some(String::from("*Beta*,*Hack*")),
        ..FilterOptions::default()
    };

    let kept = filter_filenames(&filenames(), &options);

    assert_eq!(kept.len(), 3);
    assert!(!kept.iter().any(|f| f.contains("Beta") || f.contains("Hack")));
}

#[test]
fn test_escaped_comma_in_pattern() {
    let patterns = split_patterns(r"Pokemon Red (USA\, Europe)*,Mother*");

    assert_eq!(
        patterns,
        vec!["Pokemon Red (USA, Europe)*", "Mother*"]
    );
}

#[test]
fn test_exclusion_regex_rejects_tagged_names() {
    let options = FilterOptions {
        exclusion_regex: build_exclusion_regex(false, false, false, false),
        ..FilterOptions::default()
    };

    let kept = filter_filenames(&filenames(), &options);

    assert_eq!(
        kept,
        vec![
            "Pokemon Red (USA, Europe).zip",
            "Pokemon Blue (USA, Europe).zip",
            "Mother 3 (Japan).zip"
        ]
    );
}

#[test]
fn test_exclusion_regex_none_when_everything_included() {
    assert!(build_exclusion_regex(true, true, true, true).is_none());
}

#[test]
fn test_exclusion_regex_does_not_match_title_words() {
    let regex = build_exclusion_regex(false, true, true, true).unwrap();

    assert!(!regex.is_match("Beta Force (USA).zip"));
    assert!(regex.is_match("Beta Force (USA) (Beta).zip"));
}

#[test]
fn test_adding_include_filter_never_enlarges_output() {
    let unfiltered = filter_filenames(&filenames(), &FilterOptions::default());
    let options = FilterOptions {
        include_patterns: Some(String::from("*USA*")),
        ..FilterOptions::default()
    };

    let filtered = filter_filenames(&filenames(), &options);

    assert!(filtered.len() <= unfiltered.len());
    assert!(filtered.iter().all(|f| unfiltered.contains(f)));
}
