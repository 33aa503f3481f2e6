//! Title reconciliation between the media server and the metadata service.
//!
//! Normalization: transliterate to ASCII, lower-case, pull a trailing `(YYYY)`
//! out as a year hint, `&` becomes `and`, punctuation runs collapse to one
//! space, and a single leading article (`the`, `a`, `an`) is dropped.
use deunicode::deunicode;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use strsim::jaro_winkler;

use crate::error::MetadataError;
use crate::tvmaze::ShowCandidate;

pub const SIMILARITY_THRESHOLD: f64 = 0.90;
pub const SIMILARITY_MARGIN: f64 = 0.02;
const YEAR_BONUS: f64 = 0.05;
const ARTICLES: [&str; 3] = ["the", "a", "an"];

static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*[\(\[]((?:19|20)\d{2})[\)\]]\s*$").expect("year suffix pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTitle {
    /// Comparison key, e.g. `office us` for "The Office (US)".
    pub key: String,
    /// Title as sent to the search endpoint, without the year suffix.
    pub search_text: String,
    pub year: Option<i32>,
}

impl NormalizedTitle {
    /// Keeps a year parsed from the title; otherwise falls back to `year`.
    pub fn with_year_hint(mut self, year: Option<i32>) -> Self {
        if self.year.is_none() {
            self.year = year;
        }
        self
    }

    /// Cache and duplicate-detection key.
    pub fn lookup_key(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.key, year),
            None => self.key.clone(),
        }
    }
}

pub fn normalize_title(title: &str) -> NormalizedTitle {
    let trimmed = title.trim();
    let (base, year) = match YEAR_SUFFIX.captures(trimmed) {
        Some(caps) => {
            let start = caps.get(0).map_or(trimmed.len(), |m| m.start());
            let year = caps.get(1).and_then(|m| m.as_str().parse().ok());
            (&trimmed[..start], year)
        }
        None => (trimmed, None),
    };
    NormalizedTitle {
        key: normalize_key(base),
        search_text: base.trim().to_string(),
        year,
    }
}

fn normalize_key(input: &str) -> String {
    let ascii = deunicode(input).to_ascii_lowercase().replace('&', " and ");
    let mut out = String::with_capacity(ascii.len());
    let mut last_space = false;
    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_space = false;
        } else if ch == '\'' {
            // "Grey's" and "Greys" compare equal.
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    let words: Vec<&str> = out.split_whitespace().collect();
    match words.split_first() {
        Some((first, rest)) if !rest.is_empty() && ARTICLES.contains(first) => rest.join(" "),
        _ => words.join(" "),
    }
}

/// Picks the candidate that corresponds to `query`.
///
/// Exact key matches win, narrowed by premiere year when several share a key.
/// Without an exact match, a candidate qualifies when its plain Jaro-Winkler
/// score clears [`SIMILARITY_THRESHOLD`] and neither title's words contain
/// the other's. Qualifying candidates are ranked with a small year bonus; the
/// best must lead the runner-up by [`SIMILARITY_MARGIN`].
pub fn pick_candidate<'a>(
    title: &str,
    query: &NormalizedTitle,
    candidates: &'a [ShowCandidate],
) -> Result<&'a ShowCandidate, MetadataError> {
    let exact: Vec<&ShowCandidate> = candidates
        .iter()
        .filter(|c| normalize_title(&c.name).key == query.key)
        .collect();

    if !exact.is_empty() {
        let narrowed = narrow_by_year(exact, query.year);
        return match narrowed.as_slice() {
            [only] => Ok(*only),
            many => Err(ambiguous(title, many)),
        };
    }

    let mut scored: Vec<(f64, &ShowCandidate)> = candidates
        .iter()
        .filter_map(|c| {
            let key = normalize_title(&c.name).key;
            let base = jaro_winkler(&query.key, &key);
            if base < SIMILARITY_THRESHOLD || word_containment(&query.key, &key) {
                return None;
            }
            Some((base + year_bonus(query.year, c.premiered_year), c))
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    match scored.as_slice() {
        [(best, chosen), rest @ ..] => match rest.first() {
            Some((second, other)) if best - second < SIMILARITY_MARGIN => {
                Err(ambiguous(title, &[*chosen, *other]))
            }
            _ => Ok(*chosen),
        },
        [] => Err(MetadataError::NotFound(title.to_string())),
    }
}

/// True when one title's words are a strict superset of the other's, as in
/// "Sherlock" against "Sherlock Holmes". Those are different shows.
fn word_containment(a: &str, b: &str) -> bool {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    a != b && (a.is_subset(&b) || b.is_subset(&a))
}

fn narrow_by_year(candidates: Vec<&ShowCandidate>, year: Option<i32>) -> Vec<&ShowCandidate> {
    let Some(year) = year else {
        return candidates;
    };
    if candidates.len() <= 1 {
        return candidates;
    }
    let same_year: Vec<&ShowCandidate> = candidates
        .iter()
        .copied()
        .filter(|c| c.premiered_year == Some(year))
        .collect();
    if same_year.is_empty() {
        candidates
    } else {
        same_year
    }
}

fn year_bonus(query: Option<i32>, premiered: Option<i32>) -> f64 {
    match (query, premiered) {
        (Some(a), Some(b)) if a == b => YEAR_BONUS,
        (Some(_), Some(_)) => -YEAR_BONUS,
        _ => 0.0,
    }
}

fn ambiguous(title: &str, candidates: &[&ShowCandidate]) -> MetadataError {
    MetadataError::Ambiguous {
        title: title.to_string(),
        candidates: candidates
            .iter()
            .map(|c| match c.premiered_year {
                Some(year) => format!("{} ({}) #{}", c.name, year, c.id),
                None => format!("{} #{}", c.name, c.id),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u64, name: &str, year: Option<i32>) -> ShowCandidate {
        ShowCandidate {
            id,
            name: name.to_string(),
            premiered_year: year,
        }
    }

    #[test]
    fn normalizes_titles() {
        assert_eq!(normalize_title("The Office (US)").key, "office us");
        assert_eq!(normalize_title("Law & Order: SVU").key, "law and order svu");
        assert_eq!(normalize_title("Pokémon").key, "pokemon");
        assert_eq!(normalize_title("Grey's Anatomy").key, "greys anatomy");
        assert_eq!(normalize_title("  A Touch of Frost ").key, "touch of frost");
        assert_eq!(normalize_title("The").key, "the");
    }

    #[test]
    fn extracts_year_suffix() {
        let title = normalize_title("Doctor Who (2005)");
        assert_eq!(title.key, "doctor who");
        assert_eq!(title.search_text, "Doctor Who");
        assert_eq!(title.year, Some(2005));
        assert_eq!(title.lookup_key(), "doctor who (2005)");

        let plain = normalize_title("1923");
        assert_eq!(plain.key, "1923");
        assert_eq!(plain.year, None);
    }

    #[test]
    fn year_from_title_beats_hint() {
        let title = normalize_title("Doctor Who (1963)").with_year_hint(Some(2005));
        assert_eq!(title.year, Some(1963));
        let hinted = normalize_title("Doctor Who").with_year_hint(Some(2005));
        assert_eq!(hinted.year, Some(2005));
    }

    #[test]
    fn exact_match_wins_over_similar_names() {
        let candidates = vec![
            candidate(1, "Breaking Bad: Original Minisodes", Some(2009)),
            candidate(2, "Breaking Bad", Some(2008)),
        ];
        let query = normalize_title("Breaking Bad");
        let chosen = pick_candidate("Breaking Bad", &query, &candidates).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn year_disambiguates_remakes() {
        let candidates = vec![
            candidate(10, "Doctor Who", Some(1963)),
            candidate(20, "Doctor Who", Some(2005)),
        ];
        let query = normalize_title("Doctor Who (2005)");
        let chosen = pick_candidate("Doctor Who (2005)", &query, &candidates).unwrap();
        assert_eq!(chosen.id, 20);
    }

    #[test]
    fn same_name_without_year_is_ambiguous() {
        let candidates = vec![
            candidate(10, "Doctor Who", Some(1963)),
            candidate(20, "Doctor Who", Some(2005)),
        ];
        let query = normalize_title("Doctor Who");
        let err = pick_candidate("Doctor Who", &query, &candidates).unwrap_err();
        match err {
            MetadataError::Ambiguous { title, candidates } => {
                assert_eq!(title, "Doctor Who");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn fuzzy_match_accepts_close_spelling() {
        let candidates = vec![candidate(5, "Marvel's Agents of S.H.I.E.L.D.", Some(2013))];
        let query = normalize_title("Marvels Agents of SHIELD");
        let chosen = pick_candidate("Marvels Agents of SHIELD", &query, &candidates).unwrap();
        assert_eq!(chosen.id, 5);
    }

    #[test]
    fn longer_title_is_not_a_fuzzy_match() {
        let candidates = vec![candidate(3, "Sherlock Holmes", Some(2010))];
        let query = normalize_title("Sherlock").with_year_hint(Some(2010));
        assert_eq!(
            pick_candidate("Sherlock", &query, &candidates),
            Err(MetadataError::NotFound("Sherlock".to_string()))
        );

        let candidates = vec![candidate(4, "Star Trek: Picard", Some(2020))];
        let query = normalize_title("Star Trek").with_year_hint(Some(2020));
        assert_eq!(
            pick_candidate("Star Trek", &query, &candidates),
            Err(MetadataError::NotFound("Star Trek".to_string()))
        );
    }

    #[test]
    fn year_bonus_cannot_lift_a_weak_score() {
        let candidates = vec![candidate(6, "Dexter: New Blood", Some(2021))];
        let query = normalize_title("Dexter Resurrection").with_year_hint(Some(2021));
        assert!(jaro_winkler("dexter resurrection", "dexter new blood") < SIMILARITY_THRESHOLD);
        assert_eq!(
            pick_candidate("Dexter Resurrection", &query, &candidates),
            Err(MetadataError::NotFound("Dexter Resurrection".to_string()))
        );
    }

    #[test]
    fn word_containment_is_strict() {
        assert!(word_containment("sherlock", "sherlock holmes"));
        assert!(word_containment("star trek picard", "star trek"));
        assert!(!word_containment("office us", "office us"));
        assert!(!word_containment("marvels agents of shield", "marvels agents of s h i e l d"));
    }

    #[test]
    fn unrelated_results_are_not_found() {
        let candidates = vec![candidate(1, "Friends", Some(1994))];
        let query = normalize_title("Severance");
        assert_eq!(
            pick_candidate("Severance", &query, &candidates),
            Err(MetadataError::NotFound("Severance".to_string()))
        );
        assert_eq!(
            pick_candidate("Severance", &query, &[]),
            Err(MetadataError::NotFound("Severance".to_string()))
        );
    }
}
