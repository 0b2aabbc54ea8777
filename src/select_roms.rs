use super::name_parser::{RomRecord, VersionInfo, parse_rom_name};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LangScope {
    #[default]
    Any,
    /// The preferred language becomes a hard include filter.
    Strict,
    /// Allowed languages expand to the preferred language plus English.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SelectOptions {
    pub region_priority: Vec<String>,
    pub language_priority: Vec<String>,
    pub preferred_region: Option<String>,
    pub preferred_language: Option<String>,
    pub lang_scope: LangScope,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            region_priority: vec![
                String::from("eu"),
                String::from("us"),
                String::from("wor"),
                String::from("jp"),
            ],
            language_priority: vec![String::from("en")],
            preferred_region: None,
            preferred_language: None,
            lang_scope: LangScope::Any,
        }
    }
}

struct Candidate {
    filename: String,
    position: usize,
    record: RomRecord,
}

/// Keep at most one representative per title; multi-disc sets are kept whole.
/// Input is assumed filter-passed; output preserves input order.
pub fn select_one_per_title(filenames: &[String], options: &SelectOptions) -> Vec<String> {
    let region_priority = hoist(&options.region_priority, &options.preferred_region);
    let language_priority = hoist(&options.language_priority, &options.preferred_language);

    let mut candidates: Vec<Candidate> = filenames
        .iter()
        .enumerate()
        .map(|(position, filename)| Candidate {
            filename: filename.clone(),
            position,
            record: parse_rom_name(filename),
        })
        .collect();

    if let Some(preferred) = &options.preferred_language {
        match options.lang_scope {
            LangScope::Strict => {
                candidates.retain(|candidate| {
                    candidate.record.languages.iter().any(|l| l == preferred)
                });
            }
            LangScope::Fallback => {
                // untagged records are kept, they are usually single-language
                candidates.retain(|candidate| {
                    candidate.record.languages.is_empty()
                        || candidate
                            .record
                            .languages
                            .iter()
                            .any(|l| l == preferred || l == "en")
                });
            }
            LangScope::Any => (),
        }
    }

    let mut groups: IndexMap<String, Vec<Candidate>> = IndexMap::new();
    for candidate in candidates {
        groups
            .entry(candidate.record.title.to_lowercase())
            .or_default()
            .push(candidate);
    }

    let mut selected: HashSet<usize> = HashSet::new();
    for (_, group) in groups {
        if group.iter().any(|candidate| candidate.record.disc.is_some()) {
            select_disc_set(&group, &region_priority, &language_priority, &mut selected);
        } else if let Some(best) = group.iter().min_by(|a, b| {
            compare_candidates(a, b, &region_priority, &language_priority)
        }) {
            selected.insert(best.position);
        }
    }

    filenames
        .iter()
        .enumerate()
        .filter(|(position, _)| selected.contains(position))
        .map(|(_, filename)| filename.clone())
        .collect()
}

/// Disc sets share `(region_codes, languages, version_info)`; the set with
/// the best-ranked member wins and every one of its disc indexes is kept.
fn select_disc_set(
    group: &[Candidate],
    region_priority: &[String],
    language_priority: &[String],
    selected: &mut HashSet<usize>,
) {
    let mut sets: IndexMap<String, Vec<&Candidate>> = IndexMap::new();
    for candidate in group {
        sets.entry(disc_set_key(&candidate.record))
            .or_default()
            .push(candidate);
    }

    let best_set = sets.values().min_by(|a, b| {
        let best_a = a
            .iter()
            .min_by(|x, y| compare_candidates(x, y, region_priority, language_priority))
            .unwrap();
        let best_b = b
            .iter()
            .min_by(|x, y| compare_candidates(x, y, region_priority, language_priority))
            .unwrap();
        compare_candidates(best_a, best_b, region_priority, language_priority)
    });

    if let Some(members) = best_set {
        let mut by_index: IndexMap<Option<u32>, &Candidate> = IndexMap::new();
        for &member in members {
            let index = member.record.disc.map(|disc| disc.index);
            let replace = match by_index.get(&index) {
                Some(&existing) => {
                    compare_candidates(existing, member, region_priority, language_priority)
                        == Ordering::Greater
                }
                None => true,
            };
            if replace {
                by_index.insert(index, member);
            }
        }
        for member in by_index.values() {
            selected.insert(member.position);
        }
    }
}

fn disc_set_key(record: &RomRecord) -> String {
    format!(
        "{}|{}|{}",
        record.region_codes.join(","),
        record.languages.join(","),
        record
            .version
            .as_deref()
            .unwrap_or_default()
    )
}

/// Lexicographic priority: region rank, language rank, version (higher is
/// better), clean flags, then filename as a stable tie-break. `Less` is
/// better.
fn compare_candidates(
    a: &Candidate,
    b: &Candidate,
    region_priority: &[String],
    language_priority: &[String],
) -> Ordering {
    region_rank(&a.record, region_priority)
        .cmp(&region_rank(&b.record, region_priority))
        .then_with(|| {
            language_rank(&a.record, language_priority)
                .cmp(&language_rank(&b.record, language_priority))
        })
        .then_with(|| version_key(&b.record).cmp(&version_key(&a.record)))
        .then_with(|| flag_count(&a.record).cmp(&flag_count(&b.record)))
        .then_with(|| a.filename.cmp(&b.filename))
}

fn region_rank(record: &RomRecord, region_priority: &[String]) -> usize {
    record
        .region_codes
        .iter()
        .map(|code| {
            region_priority
                .iter()
                .position(|p| p == code)
                .unwrap_or(region_priority.len())
        })
        .min()
        .unwrap_or(region_priority.len() + 1)
}

fn language_rank(record: &RomRecord, language_priority: &[String]) -> usize {
    record
        .languages
        .iter()
        .map(|language| {
            language_priority
                .iter()
                .position(|p| p == language)
                .unwrap_or(language_priority.len())
        })
        .min()
        .unwrap_or(language_priority.len())
}

fn version_key(record: &RomRecord) -> (Vec<u32>, u32) {
    match &record.version_info {
        Some(VersionInfo { parts, letter, .. }) => (
            parts.clone(),
            letter.map(|l| l.to_ascii_uppercase() as u32).unwrap_or(0),
        ),
        None => (Vec::new(), 0),
    }
}

fn flag_count(record: &RomRecord) -> usize {
    [
        record.flags.prerelease,
        record.flags.unlicensed,
        record.flags.hack,
        record.flags.homebrew,
    ]
    .iter()
    .filter(|flag| **flag)
    .count()
}

fn hoist(priority: &[String], preferred: &Option<String>) -> Vec<String> {
    let mut result: Vec<String> = priority.to_vec();
    if let Some(preferred) = preferred {
        if !result.contains(preferred) {
            result.insert(0, preferred.clone());
        }
    }
    result
}

#[cfg(test)]
mod test_select_disc_sets;
#[cfg(test)]
mod test_select_preferences;
