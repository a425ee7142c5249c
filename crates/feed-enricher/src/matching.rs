//! Matching algorithm: resolve a rendered entry to a payload record.
//!
//! Strategies run in a fixed order and the first hit wins; there is no
//! scoring. Rendered destinations mix work-order numbers, numeric ids and
//! internal uuids, so the same numeric token is tried against each lookup
//! before falling back to a substring scan over work numbers.
//!
//! The substring fallback can pair an entry with an unrelated item whose
//! work number happens to occur inside the entry's destination or text.
//! That false-positive risk is accepted as-is.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::index::{FeedItem, ItemIndex};
use crate::types::EntryCandidate;

/// Which rule produced a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStrategy {
    WorkNumber,
    Id,
    Uuid,
    /// Substring fallback; carries the work number found in the entry.
    ContainsWorkNumber(String),
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::WorkNumber => write!(f, "workNumber"),
            MatchStrategy::Id => write!(f, "id"),
            MatchStrategy::Uuid => write!(f, "uuid"),
            MatchStrategy::ContainsWorkNumber(wn) => write!(f, "contain-workNumber:{wn}"),
        }
    }
}

/// A resolved entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
    pub item: &'a FeedItem,
    pub strategy: MatchStrategy,
}

/// Everything a strategy may look at.
pub struct MatchInput<'a> {
    pub candidate: &'a EntryCandidate,
    /// First run of six or more digits in the destination, then the text.
    pub token: Option<&'a str>,
}

/// A single resolution rule.
pub type Strategy = for<'a> fn(&MatchInput<'a>, &'a ItemIndex) -> Option<MatchResult<'a>>;

/// Resolution rules in tie-break order.
pub const STRATEGIES: &[Strategy] = &[
    by_work_number_token,
    by_id_token,
    by_uuid_token,
    by_contained_work_number,
];

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]{6,}").expect("numeric token regex is valid"))
}

/// First run of six or more consecutive digits in the destination, else in
/// the visible text.
pub fn numeric_token(candidate: &EntryCandidate) -> Option<&str> {
    let re = token_re();
    re.find(&candidate.href)
        .or_else(|| re.find(&candidate.text))
        .map(|m| m.as_str())
}

pub fn by_work_number_token<'a>(
    input: &MatchInput<'a>,
    index: &'a ItemIndex,
) -> Option<MatchResult<'a>> {
    let item = index.by_work_number(input.token?)?;
    Some(MatchResult {
        item,
        strategy: MatchStrategy::WorkNumber,
    })
}

pub fn by_id_token<'a>(input: &MatchInput<'a>, index: &'a ItemIndex) -> Option<MatchResult<'a>> {
    let item = index.by_id(input.token?)?;
    Some(MatchResult {
        item,
        strategy: MatchStrategy::Id,
    })
}

pub fn by_uuid_token<'a>(input: &MatchInput<'a>, index: &'a ItemIndex) -> Option<MatchResult<'a>> {
    let item = index.by_uuid(input.token?)?;
    Some(MatchResult {
        item,
        strategy: MatchStrategy::Uuid,
    })
}

/// Linear scan: the first work number occurring literally in the
/// destination or the visible text.
pub fn by_contained_work_number<'a>(
    input: &MatchInput<'a>,
    index: &'a ItemIndex,
) -> Option<MatchResult<'a>> {
    let candidate = input.candidate;
    index
        .work_numbers()
        .find(|(wn, _)| {
            !wn.is_empty() && (candidate.href.contains(wn) || candidate.text.contains(wn))
        })
        .map(|(wn, item)| MatchResult {
            item,
            strategy: MatchStrategy::ContainsWorkNumber(wn.to_string()),
        })
}

/// Resolve one entry, stopping at the first strategy that succeeds.
pub fn resolve<'a>(candidate: &'a EntryCandidate, index: &'a ItemIndex) -> Option<MatchResult<'a>> {
    let input = MatchInput {
        candidate,
        token: numeric_token(candidate),
    };
    STRATEGIES.iter().find_map(|strategy| strategy(&input, index))
}
