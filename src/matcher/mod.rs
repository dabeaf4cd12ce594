/*!
 * Fuzzy Entity Matcher
 *
 * Resolves free-text spoken names to catalog entities. One scoring
 * implementation parameterized by entity kind; per-kind thresholds decide
 * when a match is taken as resolved, needs confirmation, or needs
 * clarification options.
 *
 * Score per candidate is the maximum of:
 * - exact case-folded match (1.0)
 * - alias exact match (0.95)
 * - substring containment scaled by length ratio (<= 0.8)
 * - token-wise containment with typo tolerance (<= 0.8)
 * - generic-token query ("main", "head office", ...) against the primary
 *   location (0.9, which includes the primary boost)
 * - "location N" / "site N" against the candidate's deterministic
 *   ordinal (0.9)
 *
 * Ties order by score, then primary flag, then name.
 */

use std::sync::OnceLock;

use regex::Regex;
use strsim::normalized_damerau_levenshtein;

/// Token similarity at or above this counts as a token match. 0.8 catches
/// one-typo spoken transcriptions ("smth"/"smith" at 0.8) while rejecting
/// unrelated words ("city"/"site" at 0.5).
const TOKEN_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Two candidates within this margin of the top score are ambiguous
const AMBIGUITY_MARGIN: f64 = 0.05;

/// Generic queries that refer to the primary location
const PRIMARY_LOCATION_TOKENS: &[&str] = &["main", "primary", "first", "central", "head", "office"];

/// Entity kinds the matcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Location,
    Practitioner,
    Service,
}

impl EntityKind {
    /// Minimum score for a candidate to be considered at all
    fn min_score(&self) -> f64 {
        match self {
            EntityKind::Location => 0.6,
            EntityKind::Practitioner => 0.6,
            EntityKind::Service => 0.5,
        }
    }

    /// Score at or above which the top candidate is taken without asking
    fn resolve_score(&self) -> f64 {
        0.8
    }
}

/// Confidence band of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    HighConfidence,
    MediumConfidence,
    LowConfidence,
    NoMatch,
}

/// One catalog entry offered to the matcher
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Opaque entity key handed back on a match
    pub key: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub is_primary: bool,
    /// Deterministic position for "location N" references (zero-based)
    pub ordinal: usize,
}

/// A scored candidate
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub key: String,
    pub name: String,
    pub score: f64,
    pub match_type: MatchType,
    pub is_primary: bool,
}

/// Outcome of resolving a query against a catalog
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Single confident winner
    Resolved(MatchResult),
    /// One plausible candidate; ask the caller to confirm it
    Confirm(MatchResult),
    /// Several plausible candidates; offer options
    Clarify(Vec<MatchResult>),
    /// Nothing crossed the kind's minimum threshold
    NoMatch,
}

/// Rank all candidates for a query, best first. Candidates below the
/// kind's minimum threshold are classified NoMatch and dropped.
pub fn rank(kind: EntityKind, query: &str, candidates: &[Candidate]) -> Vec<MatchResult> {
    let query_norm = normalize(query);
    if query_norm.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<MatchResult> = candidates
        .iter()
        .map(|c| {
            let score = score_candidate(kind, &query_norm, c);
            MatchResult {
                key: c.key.clone(),
                name: c.name.clone(),
                score,
                match_type: classify(kind, score),
                is_primary: c.is_primary,
            }
        })
        .filter(|r| r.match_type != MatchType::NoMatch)
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.is_primary.cmp(&a.is_primary))
            .then(a.name.cmp(&b.name))
    });

    results
}

/// Resolve a query against a catalog, applying the caller policy:
/// a clear winner at or above the resolve threshold is taken; a middling
/// single candidate asks for confirmation; near-ties and weak matches
/// return clarification options.
pub fn resolve(kind: EntityKind, query: &str, candidates: &[Candidate]) -> Resolution {
    let ranked = rank(kind, query, candidates);

    let Some(top) = ranked.first().cloned() else {
        return Resolution::NoMatch;
    };

    let near_ties: Vec<MatchResult> = ranked
        .iter()
        .filter(|r| top.score - r.score <= AMBIGUITY_MARGIN)
        .cloned()
        .collect();

    if near_ties.len() >= 2 {
        return Resolution::Clarify(near_ties);
    }

    if top.score >= kind.resolve_score() {
        Resolution::Resolved(top)
    } else if top.score >= kind.min_score() {
        Resolution::Confirm(top)
    } else {
        Resolution::Clarify(ranked)
    }
}

fn classify(kind: EntityKind, score: f64) -> MatchType {
    if score >= 0.8 {
        MatchType::HighConfidence
    } else if score >= 0.6 {
        MatchType::MediumConfidence
    } else if score >= kind.min_score() {
        MatchType::LowConfidence
    } else {
        MatchType::NoMatch
    }
}

fn score_candidate(kind: EntityKind, query_norm: &str, candidate: &Candidate) -> f64 {
    let name_norm = normalize(&candidate.name);

    // Exact case-folded match
    if query_norm == name_norm {
        return 1.0;
    }

    let mut best: f64 = 0.0;

    // Alias exact match
    if candidate
        .aliases
        .iter()
        .any(|a| normalize(a) == *query_norm)
    {
        best = best.max(0.95);
    }

    // Substring containment scaled by length ratio
    if name_norm.contains(query_norm) || query_norm.contains(&name_norm) {
        let shorter = query_norm.len().min(name_norm.len()) as f64;
        let longer = query_norm.len().max(name_norm.len()) as f64;
        if longer > 0.0 {
            best = best.max(0.8 * (shorter / longer));
        }
    }

    // Token-wise containment: fraction of query tokens present in the
    // candidate, with typo tolerance per token
    let query_tokens: Vec<&str> = query_norm.split_whitespace().collect();
    let name_tokens: Vec<&str> = name_norm.split_whitespace().collect();
    if !query_tokens.is_empty() && !name_tokens.is_empty() {
        let matched = query_tokens
            .iter()
            .filter(|qt| {
                name_tokens.iter().any(|nt| {
                    qt == &nt || normalized_damerau_levenshtein(qt, nt) >= TOKEN_SIMILARITY_THRESHOLD
                })
            })
            .count();
        best = best.max(0.8 * (matched as f64 / query_tokens.len() as f64));
    }

    if kind == EntityKind::Location {
        // Generic-token query against the primary location. The value
        // includes the primary boost, so "main" resolves at 0.9.
        if candidate.is_primary && PRIMARY_LOCATION_TOKENS.contains(&query_norm) {
            best = best.max(0.9);
        }

        // "location N" / "site N" against the deterministic ordering
        if let Some(n) = parse_positional_query(query_norm) {
            if candidate.ordinal + 1 == n {
                best = best.max(0.9);
            }
        }
    }

    best.min(1.0)
}

/// Parse "location 2" / "site two" style queries into a one-based index
fn parse_positional_query(query_norm: &str) -> Option<usize> {
    static POSITIONAL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = POSITIONAL_REGEX
        .get_or_init(|| Regex::new(r"^(?:location|site)\s+(\S+)$").unwrap());

    let captured = regex.captures(query_norm)?;
    let token = captured.get(1)?.as_str();

    if let Ok(n) = token.parse::<usize>() {
        return (n >= 1).then_some(n);
    }

    let n = match token {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        _ => return None,
    };
    Some(n)
}

fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(key: &str, name: &str, is_primary: bool, ordinal: usize) -> Candidate {
        Candidate {
            key: key.to_string(),
            name: name.to_string(),
            aliases: Vec::new(),
            is_primary,
            ordinal,
        }
    }

    fn two_locations() -> Vec<Candidate> {
        vec![
            location("b1", "City Clinic", true, 0),
            location("b2", "Suburban Clinic", false, 1),
        ]
    }

    #[test]
    fn test_exact_name_scores_one() {
        let ranked = rank(EntityKind::Location, "City Clinic", &two_locations());
        assert_eq!(ranked[0].key, "b1");
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert_eq!(ranked[0].match_type, MatchType::HighConfidence);
    }

    #[test]
    fn test_alias_match() {
        let mut candidates = two_locations();
        candidates[1].aliases.push("The Annex".to_string());
        let ranked = rank(EntityKind::Location, "the annex", &candidates);
        assert_eq!(ranked[0].key, "b2");
        assert!((ranked[0].score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_generic_main_resolves_primary_at_point_nine() {
        match resolve(EntityKind::Location, "main", &two_locations()) {
            Resolution::Resolved(top) => {
                assert_eq!(top.name, "City Clinic");
                assert!((top.score - 0.9).abs() < 1e-9);
            }
            other => panic!("expected resolved, got {:?}", other),
        }
    }

    #[test]
    fn test_shared_token_needs_clarification() {
        match resolve(EntityKind::Location, "clinic", &two_locations()) {
            Resolution::Clarify(options) => {
                let names: Vec<&str> = options.iter().map(|o| o.name.as_str()).collect();
                assert_eq!(names, vec!["City Clinic", "Suburban Clinic"]);
            }
            other => panic!("expected clarification, got {:?}", other),
        }
    }

    #[test]
    fn test_positional_location_query() {
        match resolve(EntityKind::Location, "location 2", &two_locations()) {
            Resolution::Resolved(top) => assert_eq!(top.key, "b2"),
            other => panic!("expected resolved, got {:?}", other),
        }
        match resolve(EntityKind::Location, "site two", &two_locations()) {
            Resolution::Resolved(top) => assert_eq!(top.key, "b2"),
            other => panic!("expected resolved, got {:?}", other),
        }
    }

    #[test]
    fn test_practitioner_first_name_resolves() {
        let candidates = vec![
            Candidate {
                key: "p1".to_string(),
                name: "Brendan Smith".to_string(),
                aliases: Vec::new(),
                is_primary: false,
                ordinal: 0,
            },
            Candidate {
                key: "p2".to_string(),
                name: "Alice Wong".to_string(),
                aliases: Vec::new(),
                is_primary: false,
                ordinal: 1,
            },
        ];

        match resolve(EntityKind::Practitioner, "Brendan", &candidates) {
            Resolution::Resolved(top) => assert_eq!(top.key, "p1"),
            other => panic!("expected resolved, got {:?}", other),
        }
    }

    #[test]
    fn test_typo_tolerance_in_tokens() {
        let candidates = vec![Candidate {
            key: "p1".to_string(),
            name: "Brendan Smith".to_string(),
            aliases: Vec::new(),
            is_primary: false,
            ordinal: 0,
        }];

        // One dropped letter still matches via token similarity
        let ranked = rank(EntityKind::Practitioner, "brendan smth", &candidates);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].score >= 0.8);
    }

    #[test]
    fn test_unrelated_query_is_no_match() {
        assert!(matches!(
            resolve(EntityKind::Location, "xylophone", &two_locations()),
            Resolution::NoMatch
        ));
    }

    #[test]
    fn test_near_tie_margin() {
        // Two services both containing the query token tie at 0.8
        let candidates = vec![
            Candidate {
                key: "s1".to_string(),
                name: "Remedial Massage".to_string(),
                aliases: Vec::new(),
                is_primary: false,
                ordinal: 0,
            },
            Candidate {
                key: "s2".to_string(),
                name: "Sports Massage".to_string(),
                aliases: Vec::new(),
                is_primary: false,
                ordinal: 1,
            },
        ];

        assert!(matches!(
            resolve(EntityKind::Service, "massage", &candidates),
            Resolution::Clarify(_)
        ));
    }
}
