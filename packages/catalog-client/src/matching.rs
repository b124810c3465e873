//! Candidate filtering and scoring
//!
//! Every check treats a field that is missing on either side as a pass, so a
//! query only constrains the fields it actually supplies.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::models::{CandidateRecord, RecordingQuery};

/// Minimum artist overlap required to pick one of several candidates
pub const MIN_ARTIST_OVERLAP: f64 = 0.5;

/// Strip parenthesized qualifiers and all whitespace from a title
///
/// `"Shake It Off (Taylor's Version)"` becomes `"ShakeItOff"`.
pub fn normalize_title(title: &str) -> String {
    let mut depth = 0usize;
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if depth == 0 && !c.is_whitespace() => out.push(c),
            _ => {}
        }
    }
    out
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Title matches exactly or after normalization
pub fn titles_match(expected: &str, candidate: &str) -> bool {
    if expected.trim() == candidate.trim() {
        return true;
    }
    let expected = normalize_title(expected);
    !expected.is_empty() && expected == normalize_title(candidate)
}

/// Album matches exactly or as a substring in either direction
pub fn albums_match(expected: Option<&str>, candidate: Option<&str>) -> bool {
    match (present(expected), present(candidate)) {
        (Some(a), Some(b)) => a == b || a.contains(b) || b.contains(a),
        _ => true,
    }
}

/// Label matches ignoring whitespace and case
pub fn labels_match(expected: Option<&str>, candidate: Option<&str>) -> bool {
    match (present(expected), present(candidate)) {
        (Some(a), Some(b)) => strip_whitespace(a).to_lowercase() == strip_whitespace(b).to_lowercase(),
        _ => true,
    }
}

fn plain_date(value: &str) -> Option<NaiveDate> {
    let head = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Release dates match as calendar dates, ignoring any time component
pub fn dates_match(expected: Option<&str>, candidate: Option<&str>) -> bool {
    match (present(expected), present(candidate)) {
        (Some(a), Some(b)) => match (plain_date(a), plain_date(b)) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => true,
    }
}

/// Fraction of expected artist names found in the candidate's artist string
///
/// Matching is a case-insensitive substring test per expected name. Returns
/// 0.0 when there is nothing to compare.
pub fn artist_overlap(expected: &[String], candidate_artist: Option<&str>) -> f64 {
    let Some(candidate) = present(candidate_artist) else {
        return 0.0;
    };
    let candidate = candidate.to_lowercase();

    let names: Vec<String> = expected
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    if names.is_empty() {
        return 0.0;
    }

    let found = names.iter().filter(|n| candidate.contains(n.as_str())).count();
    found as f64 / names.len() as f64
}

/// Which query fields a filter enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChecks {
    /// Title, album, label and release date
    Full,
    /// Title and album
    TitleAndAlbum,
    /// Title only
    TitleOnly,
}

/// Check a candidate against the query fields selected by `checks`
pub fn candidate_matches(
    query: &RecordingQuery,
    candidate: &CandidateRecord,
    checks: FieldChecks,
) -> bool {
    if !titles_match(&query.title, &candidate.title) {
        return false;
    }
    if checks == FieldChecks::TitleOnly {
        return true;
    }
    if !albums_match(query.album.as_deref(), candidate.release_name.as_deref()) {
        return false;
    }
    if checks == FieldChecks::TitleAndAlbum {
        return true;
    }
    labels_match(query.label.as_deref(), candidate.label.as_deref())
        && dates_match(
            query.release_date.as_deref(),
            candidate.release_date.as_deref(),
        )
}

/// Drop repeated identifiers, keeping the first occurrence
pub fn dedup_by_isrc(candidates: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.isrc.to_uppercase()))
        .collect()
}

/// Outcome of choosing among filtered candidates
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    /// A single candidate was accepted
    Matched {
        candidate: CandidateRecord,
        /// Artist overlap score, `None` when the candidate was the only one
        overlap: Option<f64>,
    },
    /// Several candidates, none with enough artist overlap
    NoConfidentMatch { candidates: usize, best_overlap: f64 },
    /// Nothing survived filtering
    NotFound,
}

impl MatchDecision {
    /// Identifier of the accepted candidate, if any
    pub fn isrc(&self) -> Option<&str> {
        match self {
            MatchDecision::Matched { candidate, .. } => Some(&candidate.isrc),
            _ => None,
        }
    }
}

/// Pick the winning candidate
///
/// A singleton is accepted directly; otherwise the highest artist overlap wins
/// if it reaches [`MIN_ARTIST_OVERLAP`].
pub fn select_candidate(candidates: &[CandidateRecord], artists: &[String]) -> MatchDecision {
    match candidates {
        [] => MatchDecision::NotFound,
        [only] => MatchDecision::Matched {
            candidate: only.clone(),
            overlap: None,
        },
        many => {
            let mut best: Option<(&CandidateRecord, f64)> = None;
            for candidate in many {
                let score = artist_overlap(artists, candidate.artist_name.as_deref());
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((candidate, score));
                }
            }

            match best {
                Some((candidate, score)) if score >= MIN_ARTIST_OVERLAP => MatchDecision::Matched {
                    candidate: candidate.clone(),
                    overlap: Some(score),
                },
                other => MatchDecision::NoConfidentMatch {
                    candidates: many.len(),
                    best_overlap: other.map_or(0.0, |(_, s)| s),
                },
            }
        }
    }
}
