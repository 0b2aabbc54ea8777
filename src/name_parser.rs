use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Parsed components of a No-Intro/Redump style filename.
///
/// Created on demand from a filename, never stored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RomRecord {
    pub base_name: String,
    pub extension: String,
    pub title: String,
    pub regions: Vec<String>,
    pub region_codes: Vec<String>,
    pub languages: Vec<String>,
    pub version: Option<String>,
    pub version_info: Option<VersionInfo>,
    pub disc: Option<DiscInfo>,
    pub tags: Vec<String>,
    pub flags: RomFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    Rev,
    Ver,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VersionInfo {
    pub kind: VersionKind,
    pub parts: Vec<u32>,
    pub letter: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscInfo {
    pub index: u32,
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RomFlags {
    pub prerelease: bool,
    pub unlicensed: bool,
    pub hack: bool,
    pub homebrew: bool,
}

/// Full region keywords and their canonical codes.
static REGIONS: phf::Map<&str, &str> = phf_map! {
    "USA" => "us",
    "Europe" => "eu",
    "Japan" => "jp",
    "World" => "wor",
    "Australia" => "au",
    "Asia" => "as",
    "Korea" => "kr",
    "Brazil" => "br",
    "China" => "cn",
    "Germany" => "de",
    "France" => "fr",
    "Spain" => "es",
    "Italy" => "it",
    "Netherlands" => "nl",
    "Sweden" => "se",
    "Canada" => "ca",
    "Taiwan" => "tw",
    "United Kingdom" => "uk",
    "Scandinavia" => "sca",
    "Latin America" => "lam",
};

/// Two-letter tokens that denote a region when they stand alone in a group.
static TWO_LETTER_REGIONS: phf::Map<&str, (&str, &str)> = phf_map! {
    "Fr" => ("France", "fr"),
    "De" => ("Germany", "de"),
    "Es" => ("Spain", "es"),
    "It" => ("Italy", "it"),
    "Nl" => ("Netherlands", "nl"),
    "Sv" => ("Sweden", "se"),
    "Ja" => ("Japan", "jp"),
    "Ko" => ("Korea", "kr"),
    "Zh" => ("China", "cn"),
    "Pt" => ("Portugal", "pt"),
};

static LANGUAGES: phf::Map<&str, &str> = phf_map! {
    "En" => "en",
    "Fr" => "fr",
    "De" => "de",
    "Es" => "es",
    "It" => "it",
    "Nl" => "nl",
    "Sv" => "sv",
    "Ja" => "ja",
    "Ko" => "ko",
    "Zh" => "zh",
    "Pt" => "pt",
    "Da" => "da",
    "No" => "no",
    "Fi" => "fi",
    "Pl" => "pl",
    "Ru" => "ru",
    "El" => "el",
    "Tr" => "tr",
    "Cs" => "cs",
    "Hu" => "hu",
};

static PRERELEASE_KEYWORDS: [&str; 6] = ["Beta", "Demo", "Proto", "Prototype", "Sample", "Preview"];
static UNLICENSED_KEYWORDS: [&str; 3] = ["Unl", "Pirate", "Bootleg"];

lazy_static! {
    static ref REV_NUMERIC_REGEX: Regex = Regex::new(r"^Rev ([0-9]+(?:\.[0-9]+)*)$").unwrap();
    static ref REV_LETTER_REGEX: Regex = Regex::new(r"^Rev ([A-Z])$").unwrap();
    static ref VERSION_REGEX: Regex = Regex::new(r"^[vV]([0-9]+(?:\.[0-9]+)*)([A-Za-z])?$").unwrap();
    static ref BETA_NUMERIC_REGEX: Regex = Regex::new(r"^Beta ([0-9]+)$").unwrap();
    static ref DISC_REGEX: Regex = Regex::new(r"^Disc ([0-9]+)(?: of ([0-9]+))?$").unwrap();
}

/// Parse a filename into a structured record.
pub fn parse_rom_name(filename: &str) -> RomRecord {
    let (base_name, extension) = split_extension(filename);
    let (title, groups) = extract_title_and_groups(&base_name);

    let mut record = RomRecord {
        base_name: base_name.clone(),
        extension,
        title,
        regions: Vec::new(),
        region_codes: Vec::new(),
        languages: Vec::new(),
        version: None,
        version_info: None,
        disc: None,
        tags: Vec::new(),
        flags: RomFlags::default(),
    };

    for group in &groups {
        classify_group(group, &mut record);
    }

    record
}

fn split_extension(filename: &str) -> (String, String) {
    match filename.rsplit_once('.') {
        Some((base, extension)) if !base.is_empty() => {
            (base.to_string(), extension.to_lowercase())
        }
        _ => (filename.to_string(), String::new()),
    }
}

/// Split a name into the leading title and the contents of every
/// parenthesized or bracketed group, in order.
fn extract_title_and_groups(name: &str) -> (String, Vec<String>) {
    let mut groups = Vec::new();
    let mut title_end = None;
    let mut chars = name.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        let close = match ch {
            '(' => ')',
            '[' => ']',
            _ => continue,
        };
        if title_end.is_none() {
            title_end = Some(i);
        }
        let start = i + 1;
        let mut end = start;
        let mut depth = 1u32;
        for (j, c) in chars.by_ref() {
            if c == ch {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    end = j;
                    break;
                }
            }
        }
        let content = name[start..end].trim();
        if !content.is_empty() {
            groups.push(content.to_string());
        }
    }

    let title = match title_end {
        Some(position) => name[..position].to_string(),
        None => name.to_string(),
    };
    let title = title
        .trim()
        .trim_end_matches(|c: char| c == '-' || c == ',' || c.is_whitespace())
        .to_string();

    (title, groups)
}

fn classify_group(group: &str, record: &mut RomRecord) {
    if let Some(captures) = DISC_REGEX.captures(group) {
        record.disc = Some(DiscInfo {
            index: captures.get(1).unwrap().as_str().parse().unwrap(),
            total: captures.get(2).map(|m| m.as_str().parse().unwrap()),
        });
        return;
    }

    if let Some(captures) = REV_NUMERIC_REGEX.captures(group) {
        record.version = Some(group.to_string());
        record.version_info = Some(VersionInfo {
            kind: VersionKind::Rev,
            parts: parse_numeric_parts(captures.get(1).unwrap().as_str()),
            letter: None,
        });
        return;
    }

    if let Some(captures) = REV_LETTER_REGEX.captures(group) {
        record.version = Some(group.to_string());
        record.version_info = Some(VersionInfo {
            kind: VersionKind::Rev,
            parts: Vec::new(),
            letter: captures.get(1).unwrap().as_str().chars().next(),
        });
        return;
    }

    if let Some(captures) = VERSION_REGEX.captures(group) {
        record.version = Some(group.to_string());
        record.version_info = Some(VersionInfo {
            kind: VersionKind::Ver,
            parts: parse_numeric_parts(captures.get(1).unwrap().as_str()),
            letter: captures.get(2).and_then(|m| m.as_str().chars().next()),
        });
        return;
    }

    if let Some(captures) = BETA_NUMERIC_REGEX.captures(group) {
        record.flags.prerelease = true;
        record.version = Some(group.to_string());
        record.version_info = Some(VersionInfo {
            kind: VersionKind::Ver,
            parts: parse_numeric_parts(captures.get(1).unwrap().as_str()),
            letter: None,
        });
        return;
    }

    let tokens: Vec<&str> = group.split(',').map(str::trim).collect();

    // A group made solely of two-letter tokens is a language list; a lone
    // two-letter token is a region when it maps to one.
    let all_two_letter = tokens
        .iter()
        .all(|token| token.len() == 2 && LANGUAGES.contains_key(*token));
    if all_two_letter && tokens.len() >= 2 {
        for token in &tokens {
            push_language(record, LANGUAGES.get(*token).unwrap());
        }
        return;
    }

    let mut unclassified = Vec::new();
    for token in &tokens {
        if let Some(code) = REGIONS.get(*token) {
            push_region(record, token, code);
        } else if let Some((region, code)) = TWO_LETTER_REGIONS.get(*token) {
            push_region(record, region, code);
        } else if let Some(language) = LANGUAGES.get(*token) {
            push_language(record, language);
        } else if PRERELEASE_KEYWORDS
            .iter()
            .any(|keyword| keyword.eq_ignore_ascii_case(token))
        {
            record.flags.prerelease = true;
        } else if UNLICENSED_KEYWORDS
            .iter()
            .any(|keyword| keyword.eq_ignore_ascii_case(token))
        {
            record.flags.unlicensed = true;
        } else if token.eq_ignore_ascii_case("Hack") {
            record.flags.hack = true;
        } else if token.eq_ignore_ascii_case("Homebrew") {
            record.flags.homebrew = true;
        } else {
            unclassified.push(*token);
        }
    }
    if !unclassified.is_empty() {
        record.tags.push(unclassified.join(", "));
    }
}

fn push_region(record: &mut RomRecord, region: &str, code: &str) {
    if !record.region_codes.iter().any(|c| c == code) {
        record.regions.push(region.to_string());
        record.region_codes.push(code.to_string());
    }
}

fn push_language(record: &mut RomRecord, language: &str) {
    if !record.languages.iter().any(|l| l == language) {
        record.languages.push(language.to_string());
    }
}

fn parse_numeric_parts(version: &str) -> Vec<u32> {
    version
        .split('.')
        .filter_map(|part| part.parse().ok())
        .collect()
}

/// Every comma-separated token found in parenthesized or bracketed groups,
/// lowercased. Unlike `RomRecord.tags` this includes classified keywords.
pub fn parenthesized_tokens(name: &str) -> Vec<String> {
    let (_, groups) = extract_title_and_groups(name);
    groups
        .iter()
        .flat_map(|group| group.split(','))
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Language codes unambiguously implied by a region, used when inferring
/// languages for filtering purposes only.
pub fn language_for_region_code(code: &str) -> Option<&'static str> {
    match code {
        "us" | "au" | "uk" => Some("en"),
        "jp" => Some("ja"),
        "fr" => Some("fr"),
        "de" => Some("de"),
        "es" => Some("es"),
        "it" => Some("it"),
        "nl" => Some("nl"),
        "se" => Some("sv"),
        "br" | "pt" => Some("pt"),
        "kr" => Some("ko"),
        "cn" | "tw" => Some("zh"),
        _ => None,
    }
}

#[cfg(test)]
mod test_parse_versions;
