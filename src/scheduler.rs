//! Drives every outstanding pair of submissions to completion, one pair and one time slice at a
//! time, persisting results and resumable alignment state to a [`DocumentStore`].
//!
//! Documents:
//! - `submission.<name>`: the preprocessed text with its content hash and archive flag.
//! - `result.<a>.<b>`: the [`AlignmentResult`] of the pair.
//! - `state.<a>.<b>`: validity masks and tiled checkpoint of an unfinished pair.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    algorithm::{start, tiled::TiledCheckpoint, AlgorithmKind, Alignment, AlignmentOptions},
    report::{content_hash, pair_key, AlignmentResult, PairState, Report, SubmissionInfo},
    store::{DocumentStore, Since, Upsert},
    token::{tokenizer::TokenizerKind, Interner, TokenIndex, TokenSequence},
};

const SUBMISSION_PREFIX: &str = "submission.";
const RESULT_PREFIX: &str = "result.";
const STATE_PREFIX: &str = "state.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub algorithm: AlgorithmKind,
    pub options: AlignmentOptions,
    pub tokenizer: TokenizerKind,
    pub time_slice: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> SchedulerSettings {
        SchedulerSettings {
            algorithm: AlgorithmKind::Auto,
            options: AlignmentOptions::default(),
            tokenizer: TokenizerKind::Whitespace,
            time_slice: Duration::from_millis(250),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDoc {
    pub name: String,
    pub hash: String,
    #[serde(default)]
    pub archive: bool,
    pub total_tokens: usize,
    pub content: String,
}

impl SubmissionDoc {
    fn info(&self) -> SubmissionInfo {
        SubmissionInfo {
            name: self.name.clone(),
            hash: self.hash.clone(),
            total_tokens: self.total_tokens,
        }
    }
}

/// What an unfinished pair needs besides its submissions to continue after a restart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct AlignmentState {
    hash: String,
    validity: [String; 2],
    checkpoint: Option<TiledCheckpoint>,
}

/// Claimed tokens as a bitmap, least significant bit first.
fn encode_validity(sequence: &TokenSequence) -> String {
    let mut bytes = vec![0u8; sequence.len().div_ceil(8)];
    for (index, token) in sequence.iter().enumerate() {
        if !token.valid {
            bytes[index / 8] |= 1 << (index % 8);
        }
    }
    STANDARD.encode(bytes)
}

fn decode_validity(encoded: &str, sequence: &mut TokenSequence) -> Result<()> {
    let bytes = STANDARD.decode(encoded)?;
    if bytes.len() != sequence.len().div_ceil(8) {
        return Err(anyhow!("mask of {} bytes for {} tokens", bytes.len(), sequence.len()));
    }
    for index in 0..sequence.len() {
        if bytes[index / 8] & (1 << (index % 8)) != 0 {
            sequence.invalidate(TokenIndex::new(index));
        }
    }
    Ok(())
}

/// Every unordered pair of `submissions` plus every archive/submission pair, each with the
/// smaller name first, sorted.
pub fn enumerate_pairs(submissions: &[&str], archive: &[&str]) -> Vec<(String, String)> {
    let ordered = |a: &str, b: &str| {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    };
    let mut pairs = vec![];
    for (i, a) in submissions.iter().enumerate() {
        for b in &submissions[i + 1..] {
            pairs.push(ordered(a, b));
        }
        for b in archive {
            pairs.push(ordered(a, b));
        }
    }
    pairs.sort();
    pairs
}

/// The pair currently being aligned, kept between slices.
struct Live {
    key: String,
    hash: String,
    alignment: Alignment,
}

pub struct Scheduler {
    store: Box<dyn DocumentStore>,
    settings: SchedulerSettings,
    submissions: BTreeMap<String, SubmissionDoc>,
    report: Report,
    live: Option<Live>,
    seen_seq: u64,
}

fn parse<T: DeserializeOwned>(key: &str, doc: Value) -> Result<T> {
    serde_json::from_value(doc).with_context(|| format!("malformed document {key}"))
}

impl Scheduler {
    /// Rebuilds the report from everything in `store`, then brings the set of pairs up to date.
    pub fn open(store: Box<dyn DocumentStore>, settings: SchedulerSettings) -> Result<Scheduler> {
        let mut scheduler = Scheduler {
            store,
            settings,
            submissions: BTreeMap::new(),
            report: Report::default(),
            live: None,
            seen_seq: 0,
        };
        for change in scheduler.store.changes(SUBMISSION_PREFIX, Since::Beginning)? {
            if let Some(doc) = change.doc {
                let submission: SubmissionDoc = parse(&change.key, doc)?;
                scheduler.submissions.insert(submission.name.clone(), submission);
            }
        }
        for change in scheduler.store.changes(RESULT_PREFIX, Since::Beginning)? {
            if let Some(doc) = change.doc {
                scheduler.report.insert(parse(&change.key, doc)?);
            }
        }
        scheduler.seen_seq = scheduler.store.last_seq();
        info!(
            submissions = scheduler.submissions.len(),
            results = scheduler.report.results.len(),
            "opened store at seq {}",
            scheduler.seen_seq
        );
        scheduler.reconcile()?;
        Ok(scheduler)
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn submissions(&self) -> impl Iterator<Item = &SubmissionDoc> + '_ {
        self.submissions.values()
    }

    /// Stores a submission. Returns false if it was already stored with the same content.
    pub fn add_submission(&mut self, name: &str, content: String, archive: bool) -> Result<bool> {
        let total_tokens = self.settings.tokenizer.tokenize(&content, &Interner::new()).len();
        let submission = SubmissionDoc {
            name: name.to_string(),
            hash: content_hash(&content),
            archive,
            total_tokens,
            content,
        };
        let doc = serde_json::to_value(&submission)?;
        let key = format!("{SUBMISSION_PREFIX}{name}");
        let upsert = self.store.upsert(&key, &mut |_| Some(doc.clone()))?;
        if upsert == Upsert::Unchanged {
            return Ok(false);
        }
        info!(total_tokens, archive, "stored submission {name}");
        self.drop_live_involving(name);
        self.submissions.insert(name.to_string(), submission);
        self.reconcile()?;
        Ok(true)
    }

    /// Deletes a submission and every result that refers to it.
    pub fn remove_submission(&mut self, name: &str) -> Result<bool> {
        let removed = self.store.delete(&format!("{SUBMISSION_PREFIX}{name}"))?;
        if self.submissions.remove(name).is_some() || removed {
            info!("removed submission {name}");
            self.drop_live_involving(name);
            self.reconcile()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Applies submission and result changes written to the store by someone else since the
    /// last sync. Returns how many submissions changed.
    pub fn sync(&mut self) -> Result<usize> {
        let since = Since::Seq(self.seen_seq);
        let submission_changes = self.store.changes(SUBMISSION_PREFIX, since)?;
        let result_changes = self.store.changes(RESULT_PREFIX, since)?;
        self.seen_seq = self.store.last_seq();

        let mut changed = 0;
        for change in submission_changes {
            let name = &change.key[SUBMISSION_PREFIX.len()..];
            match change.doc {
                Some(doc) => {
                    let submission: SubmissionDoc = parse(&change.key, doc)?;
                    if self.submissions.get(name) != Some(&submission) {
                        self.drop_live_involving(name);
                        self.submissions.insert(name.to_string(), submission);
                        changed += 1;
                    }
                }
                None => {
                    if self.submissions.remove(name).is_some() {
                        self.drop_live_involving(name);
                        changed += 1;
                    }
                }
            }
        }
        for change in result_changes {
            let key = &change.key[RESULT_PREFIX.len()..];
            match change.doc {
                Some(doc) => self.report.insert(parse(&change.key, doc)?),
                None => {
                    self.report.results.remove(key);
                }
            }
        }
        if changed > 0 {
            debug!(changed, "synced submissions");
            self.reconcile()?;
        }
        Ok(changed)
    }

    fn drop_live_involving(&mut self, name: &str) {
        let involved = self.live.as_ref().map_or(false, |live| {
            self.report.get(&live.key).map_or(true, |result| result.involves(name))
        });
        if involved {
            self.live = None;
        }
    }

    /// Makes the stored results match the current submissions: new pairs start pending, pairs
    /// whose content changed go stale and restart, pairs that no longer exist are deleted.
    fn reconcile(&mut self) -> Result<()> {
        let (archive, regular): (Vec<&SubmissionDoc>, Vec<&SubmissionDoc>) =
            self.submissions.values().partition(|submission| submission.archive);
        fn names(docs: Vec<&SubmissionDoc>) -> Vec<&str> {
            docs.into_iter().map(|doc| doc.name.as_str()).collect()
        }
        let pairs = enumerate_pairs(&names(regular), &names(archive));

        let mut wanted = BTreeSet::new();
        for (a, b) in pairs {
            let key = pair_key(&a, &b);
            let infos = [&a, &b].map(|name| self.submissions.get(name).map(SubmissionDoc::info));
            let [Some(a), Some(b)] = infos else {
                continue;
            };
            wanted.insert(key.clone());
            match self.report.get(&key) {
                Some(result) if result.matches_hash(&a, &b) => continue,
                Some(result) => {
                    let mut stale = result.clone();
                    stale.state = PairState::Stale;
                    stale.complete = false;
                    self.write_result(&stale)?;
                    info!("{key} is stale, regenerating");
                }
                None => debug!("new pair {key}"),
            }
            if self.live.as_ref().map_or(false, |live| live.key == key) {
                self.live = None;
            }
            self.store.delete(&format!("{STATE_PREFIX}{key}"))?;
            self.write_result(&AlignmentResult::pending(&a, &b))?;
        }

        let obsolete: Vec<String> = self
            .report
            .results
            .keys()
            .filter(|key| !wanted.contains(*key))
            .cloned()
            .collect();
        for key in obsolete {
            debug!("deleting obsolete pair {key}");
            self.store.delete(&format!("{RESULT_PREFIX}{key}"))?;
            self.store.delete(&format!("{STATE_PREFIX}{key}"))?;
            self.report.results.remove(&key);
            if self.live.as_ref().map_or(false, |live| live.key == key) {
                self.live = None;
            }
        }
        Ok(())
    }

    fn write_result(&mut self, result: &AlignmentResult) -> Result<()> {
        let doc = serde_json::to_value(result)?;
        self.store
            .upsert(&format!("{RESULT_PREFIX}{}", result.name), &mut |_| Some(doc.clone()))?;
        self.report.insert(result.clone());
        Ok(())
    }

    /// The outstanding pair with the closest token counts, then the smallest comparison.
    fn select(&self) -> Option<String> {
        self.report
            .outstanding()
            .min_by_key(|result| {
                let [a, b] = [0, 1].map(|side| result.submissions[side].total_tokens as u64);
                (a.abs_diff(b), a.saturating_mul(b), result.name.clone())
            })
            .map(|result| result.name.clone())
    }

    /// Tokenizes both sides with an interner of their own, so lexeme ids and with them the side
    /// order `start` settles on are the same in every process.
    fn sequences_for(&self, result: &AlignmentResult) -> Result<[TokenSequence; 2]> {
        let interner = Interner::new();
        let mut sequences = vec![];
        for name in result.side_names() {
            let submission = self
                .submissions
                .get(name)
                .ok_or_else(|| anyhow!("submission {name} of {} is missing", result.name))?;
            sequences.push(self.settings.tokenizer.tokenize(&submission.content, &interner));
        }
        let [a, b]: [TokenSequence; 2] = sequences
            .try_into()
            .map_err(|_| anyhow!("pair {} does not have two sides", result.name))?;
        Ok([a, b])
    }

    /// Loads the saved validity masks into `sequences`. A state document that cannot be read is
    /// deleted and the pair starts over.
    fn restore_state(&mut self, result: &AlignmentResult, sequences: &mut [TokenSequence; 2]) -> Result<Option<TiledCheckpoint>> {
        let key = format!("{STATE_PREFIX}{}", result.name);
        let Some(doc) = self.store.get(&key)? else {
            return Ok(None);
        };
        let state: AlignmentState = match parse(&key, doc) {
            Ok(state) => state,
            Err(e) => {
                warn!("discarding saved state of {}: {e:#}", result.name);
                self.store.delete(&key)?;
                return Ok(None);
            }
        };
        if state.hash != result.hash {
            warn!("ignoring saved state of {} computed from other contents", result.name);
            return Ok(None);
        }
        let decoded: Result<()> = sequences
            .iter_mut()
            .zip(&state.validity)
            .try_for_each(|(sequence, mask)| decode_validity(mask, sequence));
        if let Err(e) = decoded {
            warn!("ignoring saved state of {}: {e}", result.name);
            for sequence in sequences.iter_mut() {
                sequence.reset_validity();
            }
            return Ok(None);
        }
        debug!("restored state of {}", result.name);
        Ok(state.checkpoint)
    }

    /// Starts or resumes the comparison of `result`. The inner error is why this pair cannot run
    /// and fails only the pair; the outer one is a store failure.
    fn begin(&mut self, result: &AlignmentResult) -> Result<std::result::Result<Live, String>> {
        let mut sequences = match self.sequences_for(result) {
            Ok(sequences) => sequences,
            Err(e) => return Ok(Err(format!("{e:#}"))),
        };
        let checkpoint = self.restore_state(result, &mut sequences)?;
        let live = start(self.settings.algorithm, sequences, &self.settings.options, checkpoint)
            .map(|alignment| Live {
                key: result.name.clone(),
                hash: result.hash.clone(),
                alignment,
            })
            .map_err(|e| e.to_string());
        Ok(live)
    }

    fn persist_state(&mut self, live: &Live) -> Result<()> {
        let sequences = live.alignment.executor.sequences();
        let state = AlignmentState {
            hash: live.hash.clone(),
            validity: sequences.map(encode_validity),
            checkpoint: live.alignment.executor.checkpoint(),
        };
        let doc = serde_json::to_value(&state)?;
        self.store
            .upsert(&format!("{STATE_PREFIX}{}", live.key), &mut |_| Some(doc.clone()))?;
        Ok(())
    }

    fn fail(&mut self, mut result: AlignmentResult, error: String) -> Result<()> {
        warn!("comparison {} failed: {error}", result.name);
        result.fail(error);
        self.store.delete(&format!("{STATE_PREFIX}{}", result.name))?;
        self.write_result(&result)
    }

    /// Advances the best outstanding pair by one time slice. Returns the updated result, or None
    /// if nothing is outstanding.
    pub fn schedule_outstanding(&mut self) -> Result<Option<AlignmentResult>> {
        let Some(key) = self.select() else {
            return Ok(None);
        };
        let Some(mut result) = self.report.get(&key).cloned() else {
            return Ok(None);
        };
        let mut live = match self.live.take() {
            Some(live) if live.key == key && live.hash == result.hash => live,
            _ => match self.begin(&result)? {
                Ok(live) => {
                    info!(strategy = ?live.alignment.strategy, "comparing {key}");
                    live
                }
                Err(e) => {
                    self.fail(result.clone(), e)?;
                    return Ok(self.report.get(&key).cloned());
                }
            },
        };

        let progress = match live.alignment.executor.step(self.settings.time_slice) {
            Ok(progress) => progress,
            Err(e) => {
                self.fail(result.clone(), e.to_string())?;
                return Ok(self.report.get(&key).cloned());
            }
        };
        result.aggregate(live.alignment.executor.sequences(), progress, live.alignment.strategy);
        debug!(
            done = progress.done_work,
            total = progress.total_work,
            "slice of {key} finished"
        );
        if result.complete {
            self.store.delete(&format!("{STATE_PREFIX}{key}"))?;
            info!("{key} complete: {:.1}% matched", result.percent_matched * 100.0);
        } else {
            self.persist_state(&live)?;
            self.live = Some(live);
        }
        self.write_result(&result)?;
        Ok(Some(result))
    }

    /// Runs slices until nothing is outstanding or `max_slices` slices ran. Returns the number of
    /// slices run.
    pub fn run(&mut self, max_slices: Option<usize>) -> Result<usize> {
        self.run_until(&AtomicBool::new(false), max_slices)
    }

    /// Like [`Scheduler::run`], but also checks `stop` before every slice so another thread can
    /// halt the run between slices.
    pub fn run_until(&mut self, stop: &AtomicBool, max_slices: Option<usize>) -> Result<usize> {
        let mut slices = 0;
        while !stop.load(Ordering::Relaxed) && max_slices.map_or(true, |max| slices < max) {
            if self.schedule_outstanding()?.is_none() {
                break;
            }
            slices += 1;
        }
        if stop.load(Ordering::Relaxed) {
            info!("stopped after {slices} slices");
        }
        Ok(slices)
    }
}
