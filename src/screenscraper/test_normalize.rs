use super::*;

fn media(media_type: &str, url: &str, region: Option<&str>) -> MediaJson {
    MediaJson {
        media_type: media_type.to_string(),
        url: url.to_string(),
        format: Some(String::from("png")),
        region: region.map(String::from),
    }
}

fn jeu(medias: Vec<MediaJson>) -> JeuJson {
    JeuJson {
        id: String::from("1234"),
        noms: vec![
            NomJson {
                region: Some(String::from("jp")),
                text: String::from("Pocket Monsters Aka"),
            },
            NomJson {
                region: Some(String::from("wor")),
                text: String::from("Pokemon Red"),
            },
        ],
        region: Some(String::from("wor")),
        medias,
    }
}

#[test]
fn test_name_prefers_world_region() {
    let game = normalize_game(&jeu(vec![]));

    assert_eq!(game.id, 1234);
    assert_eq!(game.name, "Pokemon Red");
}

#[test]
fn test_media_region_preference_world_then_us_then_first() {
    let game = normalize_game(&jeu(vec![
        media("box-2D", "https://cdn/box-jp.png", Some("jp")),
        media("box-2D", "https://cdn/box-us.png", Some("us")),
        media("box-2D", "https://cdn/box-wor.png", Some("wor")),
        media("ss", "https://cdn/ss-jp.png", Some("jp")),
        media("ss", "https://cdn/ss-us.png", Some("us")),
        media("video", "https://cdn/video.mp4", None),
    ]));

    assert_eq!(game.media.box_front.unwrap().url, "https://cdn/box-wor.png");
    assert_eq!(game.media.screenshot.unwrap().url, "https://cdn/ss-us.png");
    assert_eq!(game.media.video.unwrap().url, "https://cdn/video.mp4");
    assert!(game.media.box_back.is_none());
}

#[test]
fn test_ss_game_is_a_screenshot_fallback() {
    let game = normalize_game(&jeu(vec![media(
        "ss-game",
        "https://cdn/ss-game.png",
        None,
    )]));

    assert_eq!(game.media.screenshot.unwrap().url, "https://cdn/ss-game.png");
}

#[test]
fn test_normalized_video_preferred() {
    let game = normalize_game(&jeu(vec![
        media("video", "https://cdn/raw.mp4", None),
        media("video-normalized", "https://cdn/normalized.mp4", None),
    ]));

    assert_eq!(game.media.video.unwrap().url, "https://cdn/normalized.mp4");
}

#[test]
fn test_missing_format_defaults_to_png() {
    let mut medias = vec![media("box-2D", "https://cdn/box.png", None)];
    medias[0].format = None;

    let game = normalize_game(&jeu(medias));

    assert_eq!(game.media.box_front.unwrap().format, "png");
}
