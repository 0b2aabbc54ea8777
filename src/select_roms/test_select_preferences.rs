use super::*;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_preferred_region_hoists_to_front() {
    let filenames = names(&["Game (USA).gb", "Game (Europe).gb", "Game (Japan).gb"]);
    let options = SelectOptions {
        preferred_region: Some(String::from("jp")),
        ..SelectOptions::default()
    };

    let selected = select_one_per_title(&filenames, &options);

    assert_eq!(selected, vec!["Game (Japan).gb"]);
}

#[test]
fn test_preferred_region_already_present_keeps_order() {
    let filenames = names(&["Game (USA).gb", "Game (Europe).gb"]);
    let options = SelectOptions {
        // "us" is already in the default priority list, after "eu"
        preferred_region: Some(String::from("us")),
        ..SelectOptions::default()
    };

    let selected = select_one_per_title(&filenames, &options);

    assert_eq!(selected, vec!["Game (Europe).gb"]);
}

#[test]
fn test_language_priority_breaks_region_ties() {
    let filenames = names(&[
        "Game (Europe) (De).gb",
        "Game (Europe) (En,Fr).gb",
    ]);

    let selected = select_one_per_title(&filenames, &SelectOptions::default());

    assert_eq!(selected, vec!["Game (Europe) (En,Fr).gb"]);
}

#[test]
fn test_strict_lang_scope_is_a_hard_filter() {
    let filenames = names(&[
        "Game A (Europe) (En,Fr).gb",
        "Game A (Europe) (De,Es).gb",
        "Game B (Europe) (De).gb",
    ]);
    let options = SelectOptions {
        preferred_language: Some(String::from("fr")),
        lang_scope: LangScope::Strict,
        ..SelectOptions::default()
    };

    let selected = select_one_per_title(&filenames, &options);

    assert_eq!(selected, vec!["Game A (Europe) (En,Fr).gb"]);
}

#[test]
fn test_fallback_lang_scope_allows_english_and_untagged() {
    let filenames = names(&[
        "Game A (Europe) (En).gb",
        "Game B (Europe) (De,Es).gb",
        "Game C (USA).gb",
    ]);
    let options = SelectOptions {
        preferred_language: Some(String::from("fr")),
        lang_scope: LangScope::Fallback,
        ..SelectOptions::default()
    };

    let selected = select_one_per_title(&filenames, &options);

    assert_eq!(selected.len(), 2);
    assert!(selected.contains(&String::from("Game A (Europe) (En).gb")));
    assert!(selected.contains(&String::from("Game C (USA).gb")));
}
