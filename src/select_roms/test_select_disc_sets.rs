use super::*;

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_disc_set_kept_whole_in_input_order() {
    let filenames = names(&[
        "FF7 (USA) (Disc 1).chd",
        "FF7 (USA) (Disc 2).chd",
        "FF7 (USA) (Disc 3).chd",
    ]);

    let selected = select_one_per_title(&filenames, &SelectOptions::default());

    assert_eq!(selected, filenames);
}

#[test]
fn test_best_disc_set_wins() {
    let filenames = names(&[
        "FF7 (Japan) (Disc 1).chd",
        "FF7 (Japan) (Disc 2).chd",
        "FF7 (USA) (Disc 1).chd",
        "FF7 (USA) (Disc 2).chd",
        "FF7 (USA) (Disc 3).chd",
    ]);

    let selected = select_one_per_title(&filenames, &SelectOptions::default());

    assert_eq!(
        selected,
        vec![
            "FF7 (USA) (Disc 1).chd",
            "FF7 (USA) (Disc 2).chd",
            "FF7 (USA) (Disc 3).chd"
        ]
    );
}

#[test]
fn test_selected_set_members_share_region_and_version() {
    let filenames = names(&[
        "Game (Europe) (Disc 1).chd",
        "Game (Europe) (Disc 2).chd",
        "Game (Europe) (Rev 1) (Disc 1).chd",
        "Game (Europe) (Rev 1) (Disc 2).chd",
    ]);

    let selected = select_one_per_title(&filenames, &SelectOptions::default());

    assert_eq!(
        selected,
        vec![
            "Game (Europe) (Rev 1) (Disc 1).chd",
            "Game (Europe) (Rev 1) (Disc 2).chd"
        ]
    );
}

#[test]
fn test_contiguous_disc_indexes_when_total_known() {
    let filenames = names(&[
        "Game (USA) (Disc 1 of 3).chd",
        "Game (USA) (Disc 2 of 3).chd",
        "Game (USA) (Disc 3 of 3).chd",
    ]);

    let selected = select_one_per_title(&filenames, &SelectOptions::default());

    let mut indexes: Vec<u32> = selected
        .iter()
        .map(|f| crate::name_parser::parse_rom_name(f).disc.unwrap().index)
        .collect();
    indexes.sort_unstable();
    assert_eq!(indexes, vec![1, 2, 3]);
}

#[test]
fn test_duplicate_disc_index_kept_once() {
    let filenames = names(&[
        "Game (USA) (Disc 1).chd",
        "Game (USA) (Disc 1).chd",
        "Game (USA) (Disc 2).chd",
    ]);

    let selected = select_one_per_title(&filenames, &SelectOptions::default());

    assert_eq!(selected.len(), 2);
}
