// Company name → product candidate matching.

use strsim::jaro_winkler;

use crate::adapters::extract::Candidate;

/// Minimum Jaro-Winkler similarity for a fuzzy match.
pub const FUZZY_THRESHOLD: f64 = 0.80;

/// Trailing words platforms append to product names in link text.
const NOISE_SUFFIXES: &[&str] = &["reviews", "review", "pricing", "software"];

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyMatch<'a> {
    pub candidate: &'a Candidate,
    pub exact: bool,
    pub score: f64,
}

/// First case-insensitive exact match, else the first candidate in search
/// order scoring at or above [`FUZZY_THRESHOLD`].
pub fn match_company<'a>(company: &str, candidates: &'a [Candidate]) -> Option<CompanyMatch<'a>> {
    let wanted = normalize_name(company);
    if wanted.is_empty() {
        return None;
    }

    if let Some(candidate) = candidates.iter().find(|c| normalize_name(&c.name) == wanted) {
        return Some(CompanyMatch {
            candidate,
            exact: true,
            score: 1.0,
        });
    }

    candidates.iter().find_map(|candidate| {
        let score = jaro_winkler(&wanted, &normalize_name(&candidate.name));
        (score >= FUZZY_THRESHOLD).then_some(CompanyMatch {
            candidate,
            exact: false,
            score,
        })
    })
}

/// Lowercase alphanumeric words, with trailing "reviews"/"pricing" noise removed.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    while words.len() > 1 && words.last().is_some_and(|w| NOISE_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}
