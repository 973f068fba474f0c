use tracing::warn;

use super::{
    algorithm::Strategy,
    report::{pair_key, AlignmentResult, PairState, Report, SideResult, SubmissionInfo},
};

fn info(side: &SideResult) -> SubmissionInfo {
    SubmissionInfo {
        name: side.name.clone(),
        hash: side.hash.clone(),
        total_tokens: side.total_tokens,
    }
}

pub fn validate(result: &AlignmentResult) -> Vec<String> {
    let mut errors = vec![];
    let name = &result.name;
    let [left, right] = &result.submissions;

    // Sides are stored in name order and the pair is named after them.
    if left.name > right.name {
        errors.push(format!("{name} has its sides out of order: {} before {}", left.name, right.name));
    }
    if *name != pair_key(&left.name, &right.name) {
        errors.push(format!("{name} is named differently from its sides {} and {}", left.name, right.name));
    }
    if !result.matches_hash(&info(left), &info(right)) {
        errors.push(format!("{name} has a hash that does not match its submission hashes"));
    }

    if result.done_work > result.total_work {
        errors.push(format!(
            "{name} has done {} units of work out of {}",
            result.done_work, result.total_work
        ));
    }
    // Stale and failed results keep whatever progress they had.
    let settled = matches!(result.state, PairState::Pending | PairState::InProgress | PairState::Complete);
    if settled && result.complete != (result.done_work == result.total_work) {
        errors.push(format!(
            "{name} has complete={} with {} of {} units of work done",
            result.complete, result.done_work, result.total_work
        ));
    }
    if result.complete != (result.state == PairState::Complete) {
        errors.push(format!("{name} has complete={} in state {:?}", result.complete, result.state));
    }

    // Every claimed pair of tokens takes one token from each side, except that line comparison
    // claims repeated lines as often as each side holds them.
    let paired = result.strategy != Some(Strategy::LineCompare);
    if paired && left.identical_tokens != right.identical_tokens {
        errors.push(format!(
            "{name} claims {} tokens of {} but {} tokens of {}",
            left.identical_tokens, left.name, right.identical_tokens, right.name
        ));
    }
    for side in [left, right] {
        if side.identical_tokens > side.total_tokens {
            errors.push(format!(
                "{name} claims {} of the {} tokens of {}",
                side.identical_tokens, side.total_tokens, side.name
            ));
        }
        if !(0.0..=1.0).contains(&side.percent_matched) {
            errors.push(format!("{name} matched {} of {}", side.percent_matched, side.name));
        }
    }
    if !(0.0..=1.0).contains(&result.percent_matched) {
        errors.push(format!("{name} has percentMatched {}", result.percent_matched));
    }

    if result.state == PairState::Failed && result.error.is_none() {
        errors.push(format!("{name} failed without an error message"));
    }

    errors
}

pub fn validate_report(report: &Report) -> Vec<String> {
    report.results.values().flat_map(validate).collect()
}

pub fn print_errors(errors: &[String]) {
    if !errors.is_empty() {
        warn!("result validation found {} problems", errors.len());
        for error in errors {
            warn!("  {error}");
        }
    }
}
