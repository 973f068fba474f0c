use std::{collections::BTreeMap, fmt::Write};

use float_ord::FloatOrd;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::{
    algorithm::{Progress, Strategy},
    token::TokenSequence,
};

/// Largest jump between consecutive completed scores that still counts as noise.
const SIGNIFICANT_GAP: f64 = 0.1;

pub fn content_hash(content: &str) -> String {
    format!("{:016x}", xxh64(content.as_bytes(), 0))
}

/// Key of an unordered pair: both names sorted, joined with '.'.
pub fn pair_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}.{second}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PairState {
    Pending,
    InProgress,
    Complete,
    /// A submission changed since the result was computed.
    Stale,
    Failed,
}

/// What the report needs to know about one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionInfo {
    pub name: String,
    pub hash: String,
    pub total_tokens: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideResult {
    pub name: String,
    pub hash: String,
    pub total_tokens: usize,
    pub identical_tokens: usize,
    pub percent_matched: f64,
}

impl SideResult {
    fn new(info: &SubmissionInfo) -> SideResult {
        SideResult {
            name: info.name.clone(),
            hash: info.hash.clone(),
            total_tokens: info.total_tokens,
            identical_tokens: 0,
            percent_matched: 0.0,
        }
    }

    fn update(&mut self, sequence: &TokenSequence) {
        self.total_tokens = sequence.len();
        self.identical_tokens = sequence.invalid_count();
        self.percent_matched = if self.total_tokens == 0 {
            0.0
        } else {
            self.identical_tokens as f64 / self.total_tokens as f64
        };
    }
}

/// Persisted outcome of one pair, sides in name order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentResult {
    pub name: String,
    pub hash: String,
    pub state: PairState,
    pub complete: bool,
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub oversized: bool,
    pub percent_matched: f64,
    pub total_tokens: usize,
    pub total_work: u64,
    pub done_work: u64,
    pub submissions: [SideResult; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AlignmentResult {
    pub fn pending(a: &SubmissionInfo, b: &SubmissionInfo) -> AlignmentResult {
        let (first, second) = if a.name <= b.name { (a, b) } else { (b, a) };
        AlignmentResult {
            name: pair_key(&a.name, &b.name),
            hash: pair_hash(first, second),
            state: PairState::Pending,
            complete: false,
            strategy: None,
            oversized: false,
            percent_matched: 0.0,
            total_tokens: first.total_tokens + second.total_tokens,
            total_work: 1,
            done_work: 0,
            submissions: [SideResult::new(first), SideResult::new(second)],
            error: None,
        }
    }

    pub fn side_names(&self) -> [&str; 2] {
        [&self.submissions[0].name, &self.submissions[1].name]
    }

    pub fn involves(&self, name: &str) -> bool {
        self.side_names().contains(&name)
    }

    /// True if `self` was computed from exactly these submission contents.
    pub fn matches_hash(&self, a: &SubmissionInfo, b: &SubmissionInfo) -> bool {
        let (first, second) = if a.name <= b.name { (a, b) } else { (b, a) };
        self.hash == pair_hash(first, second)
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self.state, PairState::Pending | PairState::InProgress)
    }

    /// Refreshes the scores from `sequences` (in name order) after an alignment slice.
    pub fn aggregate(&mut self, sequences: [&TokenSequence; 2], progress: Progress, strategy: Strategy) {
        for (side, sequence) in self.submissions.iter_mut().zip(sequences) {
            side.update(sequence);
        }
        self.percent_matched = (self.submissions[0].percent_matched + self.submissions[1].percent_matched) / 2.0;
        self.total_tokens = self.submissions[0].total_tokens + self.submissions[1].total_tokens;
        self.total_work = progress.total_work;
        self.done_work = progress.done_work;
        self.complete = progress.is_complete();
        self.strategy = Some(strategy);
        self.oversized = strategy == Strategy::Oversized;
        self.state = if self.complete {
            PairState::Complete
        } else {
            PairState::InProgress
        };
    }

    pub fn fail(&mut self, message: String) {
        self.state = PairState::Failed;
        self.complete = false;
        self.error = Some(message);
    }

    pub fn to_wire(&self) -> WireRecord {
        WireRecord {
            name: self.name.clone(),
            hash: self.hash.clone(),
            complete: self.complete,
            percent_matched: self.percent_matched,
            total_tokens: self.total_tokens,
            submissions: self.submissions.clone().map(|side| WireSide {
                name: side.name,
                total_tokens: side.total_tokens,
                percent_matched: side.percent_matched,
            }),
        }
    }
}

fn pair_hash(first: &SubmissionInfo, second: &SubmissionInfo) -> String {
    content_hash(&format!("{}{}", first.hash, second.hash))
}

/// The record presentation layers consume.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    pub name: String,
    pub hash: String,
    pub complete: bool,
    pub percent_matched: f64,
    pub total_tokens: usize,
    pub submissions: [WireSide; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSide {
    pub name: String,
    pub total_tokens: usize,
    pub percent_matched: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    pub results: BTreeMap<String, AlignmentResult>,
}

impl Report {
    pub fn insert(&mut self, result: AlignmentResult) {
        self.results.insert(result.name.clone(), result);
    }

    pub fn get(&self, key: &str) -> Option<&AlignmentResult> {
        self.results.get(key)
    }

    pub fn completed(&self) -> impl Iterator<Item = &AlignmentResult> + '_ {
        self.results.values().filter(|result| result.complete)
    }

    pub fn outstanding(&self) -> impl Iterator<Item = &AlignmentResult> + '_ {
        self.results.values().filter(|result| result.is_outstanding())
    }

    /// The score just above the widest gap between consecutive completed scores, or None if no
    /// gap reaches `SIGNIFICANT_GAP`.
    pub fn significant_similarity(&self) -> Option<f64> {
        let mut scores: Vec<f64> = self.completed().map(|result| result.percent_matched).collect();
        scores.sort_by_key(|&score| FloatOrd(score));
        let mut widest: Option<(f64, f64)> = None;
        for pair in scores.windows(2) {
            let gap = pair[1] - pair[0];
            if widest.map_or(true, |(widest, _)| gap > widest) {
                widest = Some((gap, pair[1]));
            }
        }
        widest.filter(|&(gap, _)| gap >= SIGNIFICANT_GAP).map(|(_, score)| score)
    }

    pub fn render_table(&self) -> String {
        let significant = self.significant_similarity();
        let width = self.results.keys().map(String::len).max().unwrap_or(4).max(4);
        let mut table = String::new();
        let _ = writeln!(table, "{:width$}  {:>8}  {:>8}  {:>8}  state", "pair", "matched", "left", "right");
        for result in self.results.values() {
            let mark = match significant {
                Some(threshold) if result.complete && result.percent_matched >= threshold => " *",
                _ => "",
            };
            let _ = writeln!(
                table,
                "{:width$}  {:>7.1}%  {:>7.1}%  {:>7.1}%  {:?}{mark}",
                result.name,
                result.percent_matched * 100.0,
                result.submissions[0].percent_matched * 100.0,
                result.submissions[1].percent_matched * 100.0,
                result.state,
            );
        }
        table
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::token::{sequence_of, Interner, TokenIndex};

    fn info(name: &str, content: &str, total_tokens: usize) -> SubmissionInfo {
        SubmissionInfo {
            name: name.to_string(),
            hash: content_hash(content),
            total_tokens,
        }
    }

    fn completed(name: &str, percent_matched: f64) -> AlignmentResult {
        let mut result = AlignmentResult::pending(&info(name, "x", 1), &info("zz", "y", 1));
        result.name = name.to_string();
        result.percent_matched = percent_matched;
        result.complete = true;
        result.state = PairState::Complete;
        result
    }

    #[test]
    fn pair_identity_is_order_independent() {
        let [a, b] = [info("alice", "one", 3), info("bob", "two", 3)];
        let forward = AlignmentResult::pending(&a, &b);
        let backward = AlignmentResult::pending(&b, &a);
        assert_eq!(forward, backward);
        assert_eq!(forward.name, "alice.bob");
        assert_eq!(forward.side_names(), ["alice", "bob"]);
        assert!(forward.matches_hash(&b, &a));
        assert!(!forward.matches_hash(&a, &info("bob", "changed", 3)));
    }

    #[test]
    fn aggregate_averages_sides() {
        let interner = Interner::new();
        let mut left = sequence_of(&interner, &["the", "cat", "sat"]);
        let mut right = sequence_of(&interner, &["the", "dog", "sat", "down"]);
        for index in [0, 2] {
            left.invalidate(TokenIndex::new(index));
            right.invalidate(TokenIndex::new(index));
        }
        let mut result = AlignmentResult::pending(&info("a", "1", 3), &info("b", "2", 4));
        result.aggregate([&left, &right], Progress::new(4, 4), Strategy::Exhaustive);
        assert_eq!(result.submissions[0].identical_tokens, 2);
        assert_eq!(result.submissions[1].percent_matched, 0.5);
        assert!((result.percent_matched - (2.0 / 3.0 + 0.5) / 2.0).abs() < 1e-12);
        assert!(result.complete);
        assert_eq!(result.state, PairState::Complete);
        assert_eq!(result.total_tokens, 7);
    }

    #[test]
    fn empty_side_scores_zero() {
        let interner = Interner::new();
        let empty = sequence_of(&interner, &[]);
        let mut result = AlignmentResult::pending(&info("a", "", 0), &info("b", "", 0));
        result.aggregate([&empty, &empty], Progress::default(), Strategy::Empty);
        assert_eq!(result.percent_matched, 0.0);
        assert!(result.complete);
    }

    #[test]
    fn wire_record_is_camel_case() {
        let result = AlignmentResult::pending(&info("a", "1", 3), &info("b", "2", 4));
        let json = serde_json::to_value(result.to_wire()).unwrap();
        assert_eq!(json["percentMatched"], 0.0);
        assert_eq!(json["totalTokens"], 7);
        assert_eq!(json["submissions"][1]["totalTokens"], 4);
        assert!(json.get("state").is_none());
    }

    #[test]
    fn significance_takes_the_widest_gap() {
        let mut report = Report::default();
        for (name, pct) in [("a", 0.05), ("b", 0.1), ("c", 0.12), ("d", 0.7), ("e", 0.75)] {
            report.insert(completed(name, pct));
        }
        assert_eq!(report.significant_similarity(), Some(0.7));
        let table = report.render_table();
        let marked: Vec<&str> = table
            .lines()
            .filter(|line| line.ends_with(" *"))
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert_eq!(marked, vec!["d", "e"]);
    }

    #[test]
    fn small_gaps_are_not_significant() {
        let mut report = Report::default();
        assert_eq!(report.significant_similarity(), None);
        report.insert(completed("a", 0.9));
        assert_eq!(report.significant_similarity(), None);
        report.insert(completed("b", 0.85));
        assert_eq!(report.significant_similarity(), None);
    }
}
