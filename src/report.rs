use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::decide::Decision;
use crate::models::NudgeKind;

/// Result of analyzing one entry of a batch.
#[derive(Debug)]
pub enum Outcome {
    Decided(Decision),
    Rejected { user_id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NudgeKindSummary {
    pub kind: NudgeKind,
    pub count: usize,
}

pub fn summarize_by_kind(outcomes: &[Outcome]) -> Vec<NudgeKindSummary> {
    let mut map: HashMap<NudgeKind, usize> = HashMap::new();

    for outcome in outcomes {
        if let Outcome::Decided(decision) = outcome {
            for nudge in &decision.response.nudges {
                *map.entry(nudge.kind).or_insert(0) += 1;
            }
        }
    }

    let mut summaries: Vec<NudgeKindSummary> = map
        .into_iter()
        .map(|(kind, count)| NudgeKindSummary { kind, count })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then(a.kind.cmp(&b.kind)));
    summaries
}

pub fn build_report(label: &str, today: NaiveDate, outcomes: &[Outcome]) -> String {
    let summaries = summarize_by_kind(outcomes);

    let mut decided: Vec<&Decision> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            Outcome::Decided(decision) => Some(decision),
            Outcome::Rejected { .. } => None,
        })
        .collect();
    decided.sort_by(|a, b| {
        b.fomo_score
            .partial_cmp(&a.fomo_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut output = String::new();

    let _ = writeln!(output, "# Engagement Nudge Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} ({} users analyzed)",
        label,
        today,
        outcomes.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Nudge Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No nudges issued.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(output, "- {}: {} nudges", summary.kind.as_str(), summary.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest FOMO Users");

    if decided.is_empty() {
        let _ = writeln!(output, "No users scored.");
    } else {
        for decision in decided.iter().take(10) {
            let kinds: Vec<&str> = decision
                .response
                .nudges
                .iter()
                .map(|nudge| nudge.kind.as_str())
                .collect();
            let _ = writeln!(
                output,
                "- {} score {:.2} nudges [{}]",
                decision.response.user_id,
                decision.fomo_score,
                kinds.join(", ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rejected Profiles");

    let rejected: Vec<(&String, &String)> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            Outcome::Rejected { user_id, reason } => Some((user_id, reason)),
            Outcome::Decided(_) => None,
        })
        .collect();

    if rejected.is_empty() {
        let _ = writeln!(output, "None.");
    } else {
        for (user_id, reason) in rejected {
            let _ = writeln!(output, "- {user_id}: {reason}");
        }
    }

    output
}
