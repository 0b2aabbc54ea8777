use super::SimpleResult;
use super::name_parser::{language_for_region_code, parse_rom_name};
use super::util::glob_match;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Name-level and structured filters applied to a listing before selection.
/// A filename survives iff it passes every active check, in this order:
/// regex include, regex exclude, pattern include, pattern exclude, list
/// include, list exclude, region/language include/exclude.
#[derive(Debug, Default)]
pub struct FilterOptions {
    pub region_filter_regex: Option<Regex>,
    pub exclusion_regex: Option<Regex>,
    pub include_patterns: Option<String>,
    pub exclude_patterns: Option<String>,
    pub include_list: Option<HashSet<String>>,
    pub exclude_list: Option<HashSet<String>>,
    pub include_region_codes: Vec<String>,
    pub exclude_region_codes: Vec<String>,
    pub include_language_codes: Vec<String>,
    pub exclude_language_codes: Vec<String>,
    pub infer_language_codes: bool,
}

/// Build the reject mask for tag categories that are not wanted.
pub fn build_exclusion_regex(
    include_prerelease: bool,
    include_unlicensed: bool,
    include_hacks: bool,
    include_homebrew: bool,
) -> Option<Regex> {
    let mut keywords: Vec<&str> = Vec::new();
    if !include_prerelease {
        keywords.extend(["Beta", "Demo", "Proto", "Prototype", "Sample", "Preview"]);
    }
    if !include_unlicensed {
        keywords.extend(["Unl", "Pirate", "Bootleg"]);
    }
    if !include_hacks {
        keywords.push("Hack");
    }
    if !include_homebrew {
        keywords.push("Homebrew");
    }
    if keywords.is_empty() {
        return None;
    }
    let pattern = format!(
        r"(?i)[(\[][^)\]]*\b(?:{})\b[^)\]]*[)\]]",
        keywords.join("|")
    );
    Some(Regex::new(&pattern).unwrap())
}

/// Split a comma-separated pattern string, honoring `\,` escapes.
pub fn split_patterns(patterns: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in patterns.chars() {
        if escaped {
            if c != ',' {
                current.push('\\');
            }
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            if !current.trim().is_empty() {
                result.push(current.trim().to_string());
            }
            current.clear();
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    if !current.trim().is_empty() {
        result.push(current.trim().to_string());
    }
    result
}

/// Load a list file of basenames, one per line. Comparison is case-folded;
/// surrounding quotes and any path prefix are stripped.
pub fn load_name_list<P: AsRef<Path>>(path: &P) -> SimpleResult<HashSet<String>> {
    let contents = try_with!(
        std::fs::read_to_string(path.as_ref()),
        "Failed to read list file \"{:?}\"",
        path.as_ref()
    );
    Ok(contents
        .lines()
        .map(normalize_list_entry)
        .filter(|line| !line.is_empty())
        .collect())
}

fn normalize_list_entry(line: &str) -> String {
    let trimmed = line.trim().trim_matches('"').trim_matches('\'');
    let without_path = trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed);
    let basename = match without_path.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => without_path,
    };
    basename.to_lowercase()
}

/// Apply every active filter, preserving input order.
pub fn filter_filenames(filenames: &[String], options: &FilterOptions) -> Vec<String> {
    filenames
        .iter()
        .filter(|filename| passes(filename, options))
        .cloned()
        .collect()
}

fn passes(filename: &str, options: &FilterOptions) -> bool {
    if let Some(regex) = &options.region_filter_regex {
        if !regex.is_match(filename) {
            return false;
        }
    }

    if let Some(regex) = &options.exclusion_regex {
        if regex.is_match(filename) {
            return false;
        }
    }

    if let Some(patterns) = &options.include_patterns {
        if !split_patterns(patterns)
            .iter()
            .any(|pattern| glob_match(pattern, filename))
        {
            return false;
        }
    }

    if let Some(patterns) = &options.exclude_patterns {
        if split_patterns(patterns)
            .iter()
            .any(|pattern| glob_match(pattern, filename))
        {
            return false;
        }
    }

    let basename = normalize_list_entry(filename);
    if let Some(list) = &options.include_list {
        if !list.contains(&basename) {
            return false;
        }
    }
    if let Some(list) = &options.exclude_list {
        if list.contains(&basename) {
            return false;
        }
    }

    let structured_active = !options.include_region_codes.is_empty()
        || !options.exclude_region_codes.is_empty()
        || !options.include_language_codes.is_empty()
        || !options.exclude_language_codes.is_empty();
    if !structured_active {
        return true;
    }

    let record = parse_rom_name(filename);

    if !options.include_region_codes.is_empty()
        && !record
            .region_codes
            .iter()
            .any(|code| options.include_region_codes.contains(code))
    {
        return false;
    }
    if record
        .region_codes
        .iter()
        .any(|code| options.exclude_region_codes.contains(code))
    {
        return false;
    }

    let mut languages = record.languages.clone();
    if languages.is_empty() && options.infer_language_codes {
        languages = record
            .region_codes
            .iter()
            .filter_map(|code| language_for_region_code(code))
            .map(String::from)
            .collect();
    }

    if !options.include_language_codes.is_empty()
        && !languages
            .iter()
            .any(|language| options.include_language_codes.contains(language))
    {
        return false;
    }
    if languages
        .iter()
        .any(|language| options.exclude_language_codes.contains(language))
    {
        return false;
    }

    true
}

#[cfg(test)]
mod test_patterns;
#[cfg(test)]
mod test_region_language;
